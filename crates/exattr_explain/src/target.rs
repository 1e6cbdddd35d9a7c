//! Output selection for attribution.

use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Which model output is explained for each sample of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// The same output index for every sample.
    Class(usize),
    /// One output index per sample, in batch order.
    PerSample(Vec<usize>),
}

impl Target {
    /// Output index for every row of a batch of `batch` samples.
    ///
    /// # Errors
    ///
    /// Returns an error if a per-sample target does not have `batch` entries.
    pub fn rows(&self, batch: usize) -> Result<Vec<usize>> {
        match self {
            Self::Class(class) => Ok(vec![*class; batch]),
            Self::PerSample(classes) if classes.len() == batch => Ok(classes.clone()),
            Self::PerSample(classes) => Err(ExplainError::InvalidTarget(format!(
                "{} per-sample targets for a batch of {batch}",
                classes.len()
            ))),
        }
    }

    /// Largest output index referenced.
    #[must_use]
    pub fn max_index(&self) -> Option<usize> {
        match self {
            Self::Class(class) => Some(*class),
            Self::PerSample(classes) => classes.iter().copied().max(),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::Class(0)
    }
}

impl From<usize> for Target {
    fn from(class: usize) -> Self {
        Self::Class(class)
    }
}

impl From<Vec<usize>> for Target {
    fn from(classes: Vec<usize>) -> Self {
        Self::PerSample(classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_rows() {
        assert_eq!(Target::Class(2).rows(3).unwrap(), vec![2, 2, 2]);
        assert_eq!(Target::default(), Target::Class(0));
    }

    #[test]
    fn test_per_sample_rows() {
        let target = Target::from(vec![0, 1]);
        assert_eq!(target.rows(2).unwrap(), vec![0, 1]);
        assert_eq!(target.max_index(), Some(1));
        assert!(matches!(target.rows(3), Err(ExplainError::InvalidTarget(_))));
    }

    #[test]
    fn test_target_serde() {
        let target = Target::PerSample(vec![3, 1]);
        let json = serde_json::to_string(&target).unwrap();
        let decoded: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, target);
    }
}
