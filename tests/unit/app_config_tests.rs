/*!
 * Tests for application configuration functionality
 */

use std::str::FromStr;

use dualsub::app_config::{Config, LogLevel, ProviderConfig, TranslationProvider};

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "zh");
    assert_eq!(config.target_languages, vec!["en".to_string()]);
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.log_level, LogLevel::Info);

    let common = &config.translation.common;
    assert_eq!(common.api_retries, 3);
    assert_eq!(common.validation_retries, 2);
    assert_eq!(common.max_concurrent_chunks, 4);
    assert_eq!(common.retry_backoff_ms, 1000);

    assert!(!config.run.force_reprocess);
    assert_eq!(config.run.only_part, None);
    assert!(config.paths.prompt_template.is_none());
}

/// A minimal file only needs languages and a translation section
#[test]
fn test_deserialize_withMinimalJson_shouldFillDefaults() {
    let json = r#"{
        "source_language": "ja",
        "target_languages": ["en", "fr"],
        "translation": {
            "provider": "lmstudio",
            "available_providers": [
                { "type": "lmstudio", "model": "qwen2.5-7b-instruct" }
            ],
            "common": { "api_retries": 1 }
        }
    }"#;

    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.translation.provider, TranslationProvider::LMStudio);
    assert_eq!(config.translation.get_model(), "qwen2.5-7b-instruct");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:1234/v1");
    assert_eq!(config.translation.common.api_retries, 1);
    assert_eq!(config.translation.common.validation_retries, 2);
    assert!(config.validation.timing_check);
    assert_eq!(config.primary_target_language(), "en");
    assert_eq!(config.output_languages(), vec!["ja".to_string(), "en".to_string()]);
    assert!(config.validate().is_ok());
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "zh".to_string();

    config.target_languages = vec!["en".to_string(), "??".to_string()];
    assert!(config.validate().is_err());
    config.target_languages = vec!["en".to_string()];

    config.validation.tail_min_coverage = 1.5;
    assert!(config.validate().is_err());
    config.validation.tail_min_coverage = 0.8;

    config.translation.set_model("  ");
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withHostedProviderAndConfiguredKey_shouldPass() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;
    let mut provider = ProviderConfig::new(TranslationProvider::Anthropic);
    provider.api_key = "sk-test".to_string();
    config.translation.available_providers = vec![provider];

    assert!(config.validate().is_ok());
    assert_eq!(config.translation.get_api_key(), "sk-test");
    assert_eq!(config.translation.get_timeout_secs(), 300);
}

#[test]
fn test_translationProvider_fromStr_shouldAcceptAllNames() {
    assert_eq!(TranslationProvider::from_str("ollama").unwrap(), TranslationProvider::Ollama);
    assert_eq!(TranslationProvider::from_str("OpenAI").unwrap(), TranslationProvider::OpenAI);
    assert_eq!(TranslationProvider::from_str("lmstudio").unwrap(), TranslationProvider::LMStudio);
    assert!(TranslationProvider::from_str("deepl").is_err());
    assert_eq!(TranslationProvider::LMStudio.display_name(), "LM Studio");
}

#[test]
fn test_logLevel_toLevelFilter_shouldMapEachLevel() {
    assert_eq!(LogLevel::Error.to_level_filter(), log::LevelFilter::Error);
    assert_eq!(LogLevel::Debug.to_level_filter(), log::LevelFilter::Debug);
}
