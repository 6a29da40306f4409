//! Cross-section template composition.
//!
//! The template is OpenSCAD-syntax source that reads the slice height from
//! an external variable, so a single file on disk serves every render job
//! in a run. Each job supplies its own height on the renderer command line.

use crate::error::{Result, SliceError};

/// Name of the externally supplied height variable.
///
/// The composed template references this variable but never assigns it;
/// render jobs define it per invocation with a `-D` override.
pub const HEIGHT_PARAM: &str = "slice_z";

/// Small offset keeping the cut plane clear of model faces that sit exactly
/// at the requested height, which produce empty or degenerate sections.
const PLANE_EPSILON: f64 = 0.001;

/// Compose the slicing template for the given model references.
///
/// The template imports every include file, takes the union of the object
/// modules minus the union of the key modules, and projects the 2D
/// cross-section of that solid at the externally supplied height.
pub fn compose_template(
    includes: &[String],
    object_modules: &[String],
    key_modules: &[String],
) -> Result<String> {
    if object_modules.is_empty() && key_modules.is_empty() {
        return Err(SliceError::InvalidConfig(
            "at least one object or key module is required".into(),
        ));
    }

    let mut header = String::new();
    for include in includes {
        header.push_str(&format!("include <{include}>;\n"));
    }
    if !header.is_empty() {
        header.push('\n');
    }

    let mut objects = String::new();
    for module in object_modules {
        objects.push_str(&format!("                {module};\n"));
    }
    let mut keys = String::new();
    for module in key_modules {
        keys.push_str(&format!("                {module};\n"));
    }

    Ok(format!(
        r#"{header}projection(cut = true) {{
    translate([0, 0, -{HEIGHT_PARAM} - {PLANE_EPSILON}]) {{
        difference() {{
            union() {{
{objects}            }}
            union() {{
{keys}            }}
        }}
    }}
}}
"#
    ))
}
