use crate::config::ControlParams;

/// Servo angle for the cold-storage vent, recomputed every tick:
///
/// `theta + (180 - theta) * light_weight * controlling_factor * (T_avg / T_ideal)`
///
/// truncated to an integer and clamped to the servo's 0..=180 range. The
/// light term is the statically configured weight, not the live light
/// average -- kept as the device firmware computes it (see DESIGN.md).
pub fn vent_angle(params: &ControlParams, temperature_average: i64) -> u8 {
    let theta = params.theta_offset_deg as f32;
    let angle = theta
        + (180.0 - theta)
            * params.light_weight
            * params.controlling_factor
            * (temperature_average as f32 / params.ideal_storage_temp_c as f32);

    (angle as i32).clamp(0, 180) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_parameters_at_ideal_temperature() {
        // 30 + 150 * 0.5 * 0.75 * 1.0 = 86.25, truncated.
        let params = ControlParams::default();
        assert_eq!(vent_angle(&params, 30), 86);
    }

    #[test]
    fn always_within_servo_range() {
        let mut params = ControlParams::default();
        for temp in [-100, -1, 0, 15, 30, 60, 500, 10_000] {
            for theta in [0, 30, 120] {
                params.theta_offset_deg = theta;
                let angle = vent_angle(&params, temp);
                assert!(angle <= 180, "angle {angle} for temp {temp}, theta {theta}");
            }
        }
    }

    #[test]
    fn monotonic_in_controlling_factor() {
        let mut params = ControlParams {
            theta_offset_deg: 20,
            light_weight: 0.8,
            ideal_storage_temp_c: 30,
            ..ControlParams::default()
        };

        let mut previous = 0;
        for step in 0..=10 {
            params.controlling_factor = step as f32 / 10.0;
            let angle = vent_angle(&params, 25);
            assert!(angle >= previous);
            previous = angle;
        }
    }

    #[test]
    fn zero_factor_leaves_offset_only() {
        let params = ControlParams {
            controlling_factor: 0.0,
            theta_offset_deg: 45,
            ..ControlParams::default()
        };
        assert_eq!(vent_angle(&params, 30), 45);
    }

    #[test]
    fn negative_intermediate_clamps_to_zero() {
        let params = ControlParams {
            theta_offset_deg: 0,
            light_weight: 1.0,
            controlling_factor: 1.0,
            ..ControlParams::default()
        };
        assert_eq!(vent_angle(&params, -100), 0);
    }
}
