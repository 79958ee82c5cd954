//! Design variables, the design space and design vectors.
//!
//! A [`DesignSpace`] is the ordered list of bounded [`DesignVariable`]s. A
//! [`DesignVector`] holds one value per variable in the same order and is
//! immutable once handed to an evaluation.

use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// A named, bounded scalar parameter of the design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignVariable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    /// Value used by single runs; the midpoint of the bounds when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl DesignVariable {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64, default: Option<f64>) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
            default,
        }
    }

    /// Default value for single runs.
    pub fn default_value(&self) -> f64 {
        self.default.unwrap_or(0.5 * (self.lower + self.upper))
    }

    /// Width of the admissible interval.
    pub fn range(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether `value` lies within `[lower, upper]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Project `value` onto `[lower, upper]`. Non-finite values map to the
    /// default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.lower, self.upper)
        } else {
            self.default_value()
        }
    }

    /// Draw a uniform sample within the bounds.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.lower..=self.upper)
    }

    /// Check the variable definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidVariable {
            name: self.name.clone(),
            reason,
        };

        if !is_identifier(&self.name) {
            return Err(invalid("name must match [A-Za-z_][A-Za-z0-9_]*".to_string()));
        }
        if !self.lower.is_finite() || !self.upper.is_finite() {
            return Err(invalid("bounds must be finite".to_string()));
        }
        if self.lower >= self.upper {
            return Err(invalid(format!(
                "lower bound {} must be below upper bound {}",
                self.lower, self.upper
            )));
        }
        if let Some(default) = self.default {
            if !self.contains(default) {
                return Err(invalid(format!(
                    "default {} outside [{}, {}]",
                    default, self.lower, self.upper
                )));
            }
        }
        Ok(())
    }
}

/// Whether `name` is a placeholder-safe identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ordered collection of design variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignSpace {
    variables: Vec<DesignVariable>,
}

impl DesignSpace {
    /// Build a space, validating every variable and name uniqueness.
    pub fn new(variables: Vec<DesignVariable>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for variable in &variables {
            variable.validate()?;
            if !seen.insert(variable.name.as_str()) {
                return Err(ConfigError::InvalidVariable {
                    name: variable.name.clone(),
                    reason: "duplicate name".to_string(),
                });
            }
        }
        Ok(Self { variables })
    }

    pub fn variables(&self) -> &[DesignVariable] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DesignVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Uniform random vector within bounds.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> DesignVector {
        let values = self.variables.iter().map(|v| v.sample(rng)).collect();
        self.vector(values)
    }

    /// Vector of default values.
    pub fn default_vector(&self) -> DesignVector {
        let values = self.variables.iter().map(|v| v.default_value()).collect();
        self.vector(values)
    }

    /// Default vector with selected values replaced. Each override must name
    /// a variable of this space and lie within its bounds.
    pub fn with_overrides(&self, overrides: &[(String, f64)]) -> Result<DesignVector, ConfigError> {
        let mut values: Vec<f64> = self.variables.iter().map(|v| v.default_value()).collect();
        for (name, value) in overrides {
            let index = self
                .variables
                .iter()
                .position(|v| &v.name == name)
                .ok_or_else(|| ConfigError::InvalidVariable {
                    name: name.clone(),
                    reason: "not a design variable".to_string(),
                })?;
            let variable = &self.variables[index];
            if !variable.contains(*value) {
                return Err(ConfigError::InvalidVariable {
                    name: name.clone(),
                    reason: format!(
                        "override {} outside [{}, {}]",
                        value, variable.lower, variable.upper
                    ),
                });
            }
            values[index] = *value;
        }
        Ok(self.vector(values))
    }

    /// Pair raw gene values with variable names. Values are clamped so the
    /// resulting vector is always within bounds.
    pub fn vector(&self, values: Vec<f64>) -> DesignVector {
        let entries = self
            .variables
            .iter()
            .zip(values)
            .map(|(variable, value)| DesignEntry {
                name: variable.name.clone(),
                value: variable.clamp(value),
            })
            .collect();
        DesignVector { entries }
    }

    /// Whether every value of `vector` lies within its variable's bounds.
    pub fn contains(&self, vector: &DesignVector) -> bool {
        vector.len() == self.len()
            && self
                .variables
                .iter()
                .zip(vector.values())
                .all(|(variable, value)| variable.contains(value))
    }
}

/// One named value of a design vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignEntry {
    pub name: String,
    pub value: f64,
}

/// Ordered `(name, value)` pairs matching the design space order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DesignVector {
    entries: Vec<DesignEntry>,
}

impl DesignVector {
    pub fn entries(&self) -> &[DesignEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the variable called `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value)
    }

    /// Values in design-space order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.value)
    }

    pub fn to_values(&self) -> Vec<f64> {
        self.values().collect()
    }

    /// SHA-256 digest of names and exact value bits, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.value.to_bits().to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for DesignVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", entry.name, entry.value)?;
        }
        Ok(())
    }
}
