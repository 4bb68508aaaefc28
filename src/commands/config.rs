use std::path::PathBuf;

use crate::state::Session;

/// Show or change runner parameters. Changes apply to the next runner
/// (`reset` or `set_dataset`); the live conversation keeps its settings.
pub fn config(session: &mut Session, param: Option<&str>, value: Option<&str>) -> String {
    match (param, value) {
        (None, _) => {
            let config = &session.config;
            format!(
                "Runner configuration:\n  dataset: {}\n  max_iterations: {}\n  temp_dir: {}",
                config.dataset.display(),
                config.max_iterations,
                config.temp_dir.display()
            )
        }
        (Some(key), Some(val)) => match key {
            "max_iterations" => match val.parse::<u32>() {
                Ok(0) | Err(_) => format!("`max_iterations` must be a positive integer, got `{}`", val),
                Ok(n) => {
                    session.config.max_iterations = n;
                    format!("`max_iterations` set to {} (takes effect on reset)", n)
                }
            },
            "temp_dir" => {
                session.config.temp_dir = PathBuf::from(val);
                format!("`temp_dir` set to {} (takes effect on reset)", val)
            }
            _ => format!(
                "Unknown param `{}`. Valid: `max_iterations`, `temp_dir`",
                key
            ),
        },
        (Some(_), None) => "Provide both param and value. Example: `config max_iterations 5`".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session;

    #[test]
    fn test_config_show_and_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());

        assert!(config(&mut session, None, None).contains("max_iterations: 3"));
        assert!(config(&mut session, Some("max_iterations"), Some("5")).contains("set to 5"));
        assert_eq!(session.config.max_iterations, 5);

        config(&mut session, Some("temp_dir"), Some("/tmp/snaps"));
        assert_eq!(session.config.temp_dir, PathBuf::from("/tmp/snaps"));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());

        assert!(config(&mut session, Some("max_iterations"), Some("0")).contains("positive"));
        assert!(config(&mut session, Some("max_iterations"), Some("many")).contains("positive"));
        assert!(config(&mut session, Some("min_answer_len"), Some("5")).starts_with("Unknown param"));
        assert!(config(&mut session, Some("max_iterations"), None).starts_with("Provide both"));
        assert_eq!(session.config.max_iterations, 3);
    }
}
