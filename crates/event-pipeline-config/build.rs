fn main() {
    // option_env!() values are cached by cargo unless these are declared.
    println!("cargo:rerun-if-env-changed=EVENT_PIPELINE_DEFAULT_COLLECTOR_URL");
}
