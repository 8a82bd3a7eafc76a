fn main() {
    // Forward esp-idf link/cfg args only when building for the board;
    // host builds (tests, fuzzing) skip the embuild plumbing entirely.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
