use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("{name} must be {requirement}, got {value}")]
    InvalidParameter {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },
}

impl ParameterError {
    pub(crate) fn invalid(name: &'static str, requirement: &'static str, value: f64) -> Self {
        Self::InvalidParameter {
            name,
            requirement,
            value,
        }
    }

    pub fn parameter_name(&self) -> &'static str {
        match self {
            Self::InvalidParameter { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_parameter_requirement_and_value() {
        let err = ParameterError::invalid("volatility", ">= 0", -0.1);
        assert_eq!(err.to_string(), "volatility must be >= 0, got -0.1");
        assert_eq!(err.parameter_name(), "volatility");
    }
}
