//! Resolves a ping response's model number to a human-readable model name.
//!
//! Per SPEC_FULL.md §1, per-model control-table metadata is out of scope;
//! this is only the small lookup discovery uses to label responders.

/// `(model_number, name)` pairs for common DYNAMIXEL X-series actuators.
const MODELS: &[(u16, &str)] = &[
	(1020, "XL430-W250"),
	(1060, "2XL430-W250"),
	(1090, "XC430-W150"),
	(1000, "XM430-W210"),
	(1030, "XM430-W350"),
	(1050, "XM540-W150"),
	(1120, "XM540-W270"),
	(1160, "XH430-W210"),
	(1080, "XH430-W350"),
	(1170, "XH540-W150"),
	(1180, "XH540-W270"),
];

/// Resolve a model number to its name, or `"unknown"` if not in the table.
pub fn model_name(model_number: u16) -> &'static str {
	MODELS.iter().find(|(number, _)| *number == model_number).map(|(_, name)| *name).unwrap_or("unknown")
}
