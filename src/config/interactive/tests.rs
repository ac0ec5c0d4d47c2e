use super::load_existing_config as load_existing_config_impl;

#[test]
fn load_existing_config() {
    let config = load_existing_config_impl().expect("config loaded successfully");
    assert!(!config.gemini.model.is_empty());
    assert!(!config.gemini.embedding_model.is_empty());
    assert!(config.gmail.max_results > 0);
    assert!(config.server.port > 0);
}
