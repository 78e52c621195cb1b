//! Example capabilities shipped with capgate.
//!
//! These back the default `functions.py` catalog. A catalog only exposes the
//! ones it declares, and a snippet only receives the ones it calls.

use rand::Rng;
use serde::Serialize;
use serde_json::{json, Number, Value};

use crate::{Arguments, CapabilityError, CapabilityLibrary};

/// Upper bound on the size of generated random sequences.
pub const MAX_RANDOM_COUNT: i64 = 1_000_000;

/// Register every example capability into `library`.
pub fn register_all(library: &mut CapabilityLibrary) {
    library.register_fn("greet", greet);
    library.register_fn("calculate", calculate);
    library.register_fn("capitalize", capitalize);
    library.register_fn("reverse", reverse);
    library.register_fn("timestamp", timestamp);
    library.register_fn("json_dumps", json_dumps);
    library.register_fn("json_loads", json_loads);
    library.register_fn("random_numbers", random_numbers);
    library.register_fn("random_int", random_int);
}

fn greet(args: &Arguments) -> Result<Value, CapabilityError> {
    let name = args.bind("greet").str(0, "name")?;
    Ok(Value::String(format!("Hello, {name}!")))
}

/// `add`/`sub`/`mul` keep integers integral; `div` is true division, with
/// zero divisors and unknown operators both yielding `0`.
fn calculate(args: &Arguments) -> Result<Value, CapabilityError> {
    let bound = args.bind("calculate");
    let a = bound.number(0, "a")?;
    let b = bound.number(1, "b")?;
    let op = bound.str(2, "op")?;

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            "add" => x.checked_add(y),
            "sub" => x.checked_sub(y),
            "mul" => x.checked_mul(y),
            "div" if y == 0 => Some(0),
            "div" => return Ok(float(x as f64 / y as f64)),
            _ => Some(0),
        };
        return result.map(Value::from).ok_or_else(|| CapabilityError::Failed {
            name: "calculate".into(),
            message: format!("integer overflow in {x} {op} {y}"),
        });
    }

    let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    Ok(match op {
        "add" => float(x + y),
        "sub" => float(x - y),
        "mul" => float(x * y),
        "div" if y == 0.0 => json!(0),
        "div" => float(x / y),
        _ => json!(0),
    })
}

fn capitalize(args: &Arguments) -> Result<Value, CapabilityError> {
    let text = args.bind("capitalize").str(0, "text")?;
    let mut chars = text.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

fn reverse(args: &Arguments) -> Result<Value, CapabilityError> {
    let text = args.bind("reverse").str(0, "text")?;
    Ok(Value::String(text.chars().rev().collect()))
}

fn timestamp(_args: &Arguments) -> Result<Value, CapabilityError> {
    let now = chrono::Local::now();
    Ok(json!({
        "iso": now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        "ts": now.timestamp_micros() as f64 / 1_000_000.0,
    }))
}

fn json_dumps(args: &Arguments) -> Result<Value, CapabilityError> {
    let data = args.bind("json_dumps").value(0, "data")?;
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    data.serialize(&mut ser)
        .map_err(|e| CapabilityError::Internal(e.into()))?;
    let text = String::from_utf8(out).map_err(|e| CapabilityError::Internal(e.into()))?;
    Ok(Value::String(text))
}

fn json_loads(args: &Arguments) -> Result<Value, CapabilityError> {
    let text = args.bind("json_loads").str(0, "text")?;
    serde_json::from_str(text).map_err(|e| CapabilityError::Failed {
        name: "json_loads".into(),
        message: e.to_string(),
    })
}

fn random_numbers(args: &Arguments) -> Result<Value, CapabilityError> {
    let n = count_arg(args, "random_numbers", 0, "n")?;
    let mut rng = rand::thread_rng();
    let values: Vec<Value> = (0..n).map(|_| float(rng.gen::<f64>())).collect();
    Ok(Value::Array(values))
}

fn random_int(args: &Arguments) -> Result<Value, CapabilityError> {
    let bound = args.bind("random_int");
    let low = bound.int(0, "low")?;
    let high = bound.int(1, "high")?;
    let count = count_arg(args, "random_int", 2, "count")?;
    if low > high {
        return Err(CapabilityError::invalid(
            "random_int",
            format!("low ({low}) must not exceed high ({high})"),
        ));
    }
    let mut rng = rand::thread_rng();
    let values: Vec<Value> = (0..count)
        .map(|_| Value::from(rng.gen_range(low..=high)))
        .collect();
    Ok(Value::Array(values))
}

fn count_arg(
    args: &Arguments,
    capability: &str,
    index: usize,
    name: &str,
) -> Result<i64, CapabilityError> {
    let n = args.bind(capability).int(index, name)?;
    if !(0..=MAX_RANDOM_COUNT).contains(&n) {
        return Err(CapabilityError::invalid(
            capability,
            format!("'{name}' must be between 0 and {MAX_RANDOM_COUNT}, got {n}"),
        ));
    }
    Ok(n)
}

fn float(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

/// JSON with `", "` and `": "` separators, matching the guest language's
/// default `json.dumps` output.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        writer.write_all(b": ")
    }
}
