#[cfg(test)]
mod tests {
    use mentor_config::ConfigLoader;
    use mentor_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_mentor_config_defaults() {
        let config = MentorConfig::default();
        assert_eq!(config.oracle.model, "gpt-4o-mini");
        assert_eq!(config.oracle.max_steps, 8);
        assert_eq!(config.oracle.request_timeout_secs, 60);
        assert_eq!(config.teaching.num_questions, 2);
        assert_eq!(config.teaching.max_retries, 3);
    }

    #[test]
    fn test_assessment_config_defaults() {
        let config = AssessmentConfig::default();
        assert_eq!(config.min_response_chars, 10);
        assert_eq!(config.full_coverage, 0.8);
        assert_eq!(config.partial_coverage, 0.5);
        assert!(
            config
                .negative_keywords
                .iter()
                .any(|k| k == "don't understand")
        );
    }

    #[test]
    fn test_review_config_interval_table() {
        let config = ReviewConfig::default();
        use mentor_core::ConfidenceLevel::*;
        assert_eq!(config.interval_for(Low), 1);
        assert_eq!(config.interval_for(Medium), 2);
        assert_eq!(config.interval_for(MediumHigh), 3);
        assert_eq!(config.interval_for(High), 7);
    }

    #[test]
    fn test_mnemonic_config_defaults() {
        let config = MnemonicConfig::default();
        assert_eq!(config.acronym_min_numbers, 3);
        assert_eq!(config.explanation_length_trigger, 300);
        assert!(!config.skip);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    // ── TOML roundtrip tests ───────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = MentorConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: MentorConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.oracle.model, config.oracle.model);
        assert_eq!(restored.teaching.num_questions, config.teaching.num_questions);
        assert_eq!(restored.search.top_k, config.search.top_k);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[oracle]
model = "gpt-4o"

[teaching]
max_retries = 5
"#;
        let config: MentorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.oracle.model, "gpt-4o");
        assert_eq!(config.teaching.max_retries, 5);
        // Defaults should fill in
        assert_eq!(config.oracle.max_steps, 8);
        assert_eq!(config.assessment.full_coverage, 0.8);
        assert_eq!(config.review.interval_days_high, 7);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_rejects_inverted_coverage() {
        let mut config = MentorConfig::default();
        config.assessment.full_coverage = 0.4;
        config.assessment.partial_coverage = 0.6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let mut config = MentorConfig::default();
        config.oracle.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_question_count_out_of_range() {
        let mut config = MentorConfig::default();
        config.teaching.num_questions = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_without_api_key() {
        let mut config = MentorConfig::default();
        config.oracle.api_key = None;
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("api_key")));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_loader_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[oracle]
model = "local/test-model"
max_steps = 4
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(file.path())).unwrap();
        let config = loader.get();
        assert_eq!(config.oracle.model, "local/test-model");
        assert_eq!(config.oracle.max_steps, 4);
        assert_eq!(loader.path(), file.path());
    }

    #[test]
    fn test_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().oracle.model, "gpt-4o-mini");
    }

    #[test]
    fn test_write_default_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentor.toml");
        ConfigLoader::write_default(&path).unwrap();
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().teaching.num_questions, 2);
    }
}
