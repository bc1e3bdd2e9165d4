//! Advisory protocol problems reported by the model-level protocol check.
//!
//! A [`ProtocolProblem`] is not an error: a model can still be constructed
//! against an insufficient protocol, and callers decide whether to abort.
//! The check collects *all* applicable problems rather than stopping at the
//! first, so a user sees the complete gap between the model's demands and
//! the acquisition at once.

/// One mismatch between a model's acquisition demands and a protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolProblem {
    /// Required columns absent from the protocol, in the model's required
    /// order.
    MissingColumns { names: Vec<String> },

    /// The protocol offers fewer distinct b-value shells than the model
    /// needs.
    InsufficientShells { required: usize, actual: usize },
}

impl std::fmt::Display for ProtocolProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolProblem::MissingColumns { names } => {
                write!(f, "Missing columns: {}", names.join(", "))
            }
            ProtocolProblem::InsufficientShells { required, actual } => {
                write!(
                    f,
                    "Required number of shells is {required}, this protocol has {actual}."
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Problem messages name every missing column and both shell counts.
    fn problem_messages_are_complete() {
        let missing = ProtocolProblem::MissingColumns {
            names: vec!["G".to_string(), "Delta".to_string()],
        };
        assert_eq!(missing.to_string(), "Missing columns: G, Delta");

        let shells = ProtocolProblem::InsufficientShells { required: 2, actual: 1 };
        assert!(shells.to_string().contains("is 2"));
        assert!(shells.to_string().contains("has 1"));
    }
}
