#[test]
fn keeper_error_expands_for_named_variants() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/keeper_error_pass.rs");
}
