//! Free-stream conditions derived from configuration and design variables.

use crate::config::FlowConfig;
use crate::design::DesignVector;
use serde::{Deserialize, Serialize};

/// Mach number used when neither a Mach number nor a velocity is configured.
pub const DEFAULT_MACH_NUMBER: f64 = 0.08;

/// Angle of attack (degrees) used when nothing else determines it.
pub const DEFAULT_ANGLE_OF_ATTACK: f64 = 3.0;

/// Range the lift-derived angle of attack is clamped to (degrees).
pub const AOA_LIMITS: (f64, f64) = (-2.0, 12.0);

/// Resolved free-stream state for one evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FlowConditions {
    pub mach_number: f64,
    pub angle_of_attack: f64,
    pub reynolds_number: f64,
    pub velocity: f64,
    pub temperature: f64,
    pub pressure: f64,
}

impl FlowConditions {
    /// Resolve the flow state.
    ///
    /// Design variables take precedence over configuration: `mach_number`
    /// (or `cruise_mach_number`), `angle_of_attack` and
    /// `cruise_lift_coefficient` are looked up in `vector` first.
    pub fn resolve(flow: &FlowConfig, vector: &DesignVector, reference_length: f64) -> Self {
        let speed_of_sound = (flow.gamma * flow.gas_constant * flow.temperature)
            .max(1e-8)
            .sqrt();

        let mach_number = vector
            .get("mach_number")
            .or_else(|| vector.get("cruise_mach_number"))
            .or(flow.mach_number)
            .or_else(|| flow.velocity.map(|v| v / speed_of_sound))
            .unwrap_or(DEFAULT_MACH_NUMBER);

        let angle_of_attack = vector
            .get("angle_of_attack")
            .or(flow.angle_of_attack)
            .or_else(|| {
                vector
                    .get("cruise_lift_coefficient")
                    .or(flow.cruise_lift_coefficient)
                    .map(|cl| lift_derived_aoa(cl, flow.zero_lift_cl, flow.cl_alpha_per_deg))
            })
            .unwrap_or(DEFAULT_ANGLE_OF_ATTACK);

        let velocity = mach_number * speed_of_sound;
        let reynolds_number = flow.density * velocity * reference_length / flow.viscosity.max(1e-12);

        Self {
            mach_number,
            angle_of_attack,
            reynolds_number,
            velocity,
            temperature: flow.temperature,
            pressure: flow.pressure,
        }
    }
}

/// Linear lift-curve estimate of the angle needed for `target_cl`.
pub fn lift_derived_aoa(target_cl: f64, zero_lift_cl: f64, cl_alpha_per_deg: f64) -> f64 {
    ((target_cl - zero_lift_cl) / cl_alpha_per_deg).clamp(AOA_LIMITS.0, AOA_LIMITS.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{DesignSpace, DesignVariable};

    fn empty_vector() -> DesignVector {
        DesignSpace::new(Vec::new()).unwrap().default_vector()
    }

    #[test]
    fn test_defaults() {
        let flow = FlowConfig::default();
        let conditions = FlowConditions::resolve(&flow, &empty_vector(), 1.0);
        assert_eq!(conditions.mach_number, DEFAULT_MACH_NUMBER);
        assert_eq!(conditions.angle_of_attack, DEFAULT_ANGLE_OF_ATTACK);
        assert!(conditions.reynolds_number > 0.0);
    }

    #[test]
    fn test_mach_from_velocity() {
        let flow = FlowConfig {
            velocity: Some(34.0),
            ..FlowConfig::default()
        };
        let conditions = FlowConditions::resolve(&flow, &empty_vector(), 1.0);
        // a = sqrt(1.4 * 287.05 * 288.15) ~= 340.3 m/s
        assert!((conditions.mach_number - 0.0999).abs() < 1e-3);
        let expected_re = 1.225 * 34.0 * 1.0 / 1.81e-5;
        assert!((conditions.reynolds_number - expected_re).abs() / expected_re < 1e-6);
    }

    #[test]
    fn test_aoa_from_cruise_lift() {
        let flow = FlowConfig {
            cruise_lift_coefficient: Some(0.5),
            ..FlowConfig::default()
        };
        let conditions = FlowConditions::resolve(&flow, &empty_vector(), 1.0);
        assert!((conditions.angle_of_attack - 3.0).abs() < 1e-9);

        assert_eq!(lift_derived_aoa(5.0, 0.2, 0.1), 12.0);
        assert_eq!(lift_derived_aoa(-1.0, 0.2, 0.1), -2.0);
    }

    #[test]
    fn test_design_variables_take_precedence() {
        let space = DesignSpace::new(vec![
            DesignVariable::new("mach_number", 0.1, 0.5, Some(0.3)),
            DesignVariable::new("angle_of_attack", 0.0, 5.0, Some(2.0)),
        ])
        .unwrap();
        let flow = FlowConfig {
            mach_number: Some(0.2),
            angle_of_attack: Some(4.0),
            ..FlowConfig::default()
        };
        let conditions = FlowConditions::resolve(&flow, &space.default_vector(), 1.0);
        assert_eq!(conditions.mach_number, 0.3);
        assert_eq!(conditions.angle_of_attack, 2.0);
    }
}
