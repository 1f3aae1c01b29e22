#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Anything that parses must serialize back and parse again.
    if let Ok(params) = servo_config::parse_params_json(data) {
        let text = serde_json::to_string(&params).expect("serialize params");
        let again = servo_config::parse_params_json(&text);
        assert!(again.is_ok(), "re-parse failed: {again:?}\n{text}");
    }
});
