//! Password strength estimation.

use super::types::PasswordStrength;
use zxcvbn::{zxcvbn, Score};

/// Local, offline strength estimator.
pub trait StrengthEvaluator: Send + Sync {
    fn evaluate(&self, password: &str) -> PasswordStrength;
}

/// Strength estimation backed by zxcvbn.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZxcvbnEvaluator;

impl StrengthEvaluator for ZxcvbnEvaluator {
    fn evaluate(&self, password: &str) -> PasswordStrength {
        if password.is_empty() {
            return PasswordStrength {
                score: 0,
                warning: "Password is empty".to_string(),
                suggestions: Vec::new(),
            };
        }

        let entropy = zxcvbn(password, &[]);
        let score = match entropy.score() {
            Score::Zero => 0,
            Score::One => 1,
            Score::Two => 2,
            Score::Three => 3,
            Score::Four => 4,
            _ => 2,
        };

        let (warning, suggestions) = match entropy.feedback() {
            Some(feedback) => (
                feedback
                    .warning()
                    .map(|w| w.to_string())
                    .unwrap_or_default(),
                feedback
                    .suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            None => (String::new(), Vec::new()),
        };

        PasswordStrength {
            score,
            warning,
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_password_is_weak() {
        let strength = ZxcvbnEvaluator.evaluate("password");
        assert!(strength.is_weak());
        assert!(!strength.warning.is_empty() || !strength.suggestions.is_empty());
    }

    #[test]
    fn long_random_passphrase_is_strong() {
        let strength = ZxcvbnEvaluator.evaluate("vK7#pQ2m!xR9zLw4@tB8");
        assert_eq!(strength.score, 4);
        assert!(!strength.is_weak());
    }

    #[test]
    fn empty_password_scores_zero() {
        let strength = ZxcvbnEvaluator.evaluate("");
        assert_eq!(strength.score, 0);
    }
}
