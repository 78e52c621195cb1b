//! Least-privilege properties of scan + filter over a real catalog source.

use std::path::Path;

use capgate_catalog::{CatalogLoader, CapabilityLibrary, LoadedCatalog};
use capgate_sandbox::{filter, ReferenceScanner};

const CATALOG: &str = r#"# Example catalog
async def greet(name: str) -> str:
    return f"Hello, {name}!"

async def calculate(a: float, b: float, op: str) -> float:
    ...

async def reverse(text: str) -> str:
    return text[::-1]

async def random_numbers(n: int) -> list[float]:
    ...

def _private_helper():
    pass
"#;

fn load(source: &str) -> LoadedCatalog {
    let library = CapabilityLibrary::builtin();
    CatalogLoader::new(&library)
        .load_source(Path::new("functions.py"), source.to_string())
        .unwrap()
}

const SNIPPETS: &[&str] = &[
    "print(await greet('World'))",
    "print(10 / 0)",
    "print(len(await random_numbers(100)))",
    "print(2 + 2)",
    "a = await reverse(await greet('x'))\nprint(await calculate(1, 2, 'add'))",
    "def greet_twice(n):\n    return n\nprint(greet_twice(1))",
    "print(await greet(",
];

#[test]
fn filtered_set_is_a_subset_of_catalog_and_references() {
    let loaded = load(CATALOG);
    let scanner = ReferenceScanner::default();

    for snippet in SNIPPETS {
        let refs = scanner.scan(snippet);
        let filtered = filter(&loaded.catalog, &refs);
        for name in filtered.names() {
            assert!(loaded.catalog.contains(&name), "{name} not in catalog");
            assert!(refs.contains(&name), "{name} not referenced by {snippet:?}");
            assert!(snippet.contains(&format!("{name}(")), "{name} not call-like in {snippet:?}");
        }
    }
}

#[test]
fn unused_catalog_entries_never_change_the_result() {
    let smaller = load(CATALOG);
    let larger = load(&format!(
        "{CATALOG}\nasync def capitalize(text: str) -> str:\n    ...\n\nasync def timestamp() -> dict:\n    ...\n"
    ));
    let scanner = ReferenceScanner::default();

    for snippet in SNIPPETS {
        let refs = scanner.scan(snippet);
        assert_eq!(
            filter(&smaller.catalog, &refs).names(),
            filter(&larger.catalog, &refs).names(),
            "snippet {snippet:?}"
        );
    }
}

#[test]
fn snippet_without_catalog_calls_gets_nothing() {
    let loaded = load(CATALOG);
    let refs = ReferenceScanner::default().scan("print(2 + 2)\nprint(list(range(3)))");
    assert!(filter(&loaded.catalog, &refs).is_empty());
}

#[test]
fn private_definitions_are_never_exposed() {
    let loaded = load(CATALOG);
    let refs = ReferenceScanner::default().scan("_private_helper()");
    assert!(!loaded.catalog.contains("_private_helper"));
    assert!(filter(&loaded.catalog, &refs).is_empty());
}

#[test]
fn scanning_is_idempotent_over_samples() {
    let scanner = ReferenceScanner::default();
    for snippet in SNIPPETS {
        assert_eq!(scanner.scan(snippet), scanner.scan(snippet));
    }
}
