/// Zero-based frame index within a sample's video.
pub type FrameId = usize;

/// Sequential, zero-based window index within a sample.
pub type WindowId = usize;

/// Check that `value` is usable as a single directory name.
///
/// Dataset subsets and sample ids arrive over the wire and are joined
/// onto the run directory, so they must never contain separators or
/// relative components.
pub fn validate_path_component(field: &str, value: &str) -> Result<(), crate::error::CoreError> {
    if value.is_empty() {
        return Err(crate::error::CoreError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(crate::error::CoreError::Validation(format!(
            "{field} must be a plain name, got \"{value}\""
        )));
    }
    Ok(())
}
