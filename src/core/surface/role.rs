/// Protocol-assigned semantic of a surface. Exactly one at a time; once
/// assigned it can never change for the lifetime of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceRole {
    #[default]
    None,
    Toplevel,
    Popup,
}

impl SurfaceRole {
    pub fn is_none(&self) -> bool {
        matches!(self, SurfaceRole::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SurfaceRole::None => "none",
            SurfaceRole::Toplevel => "toplevel",
            SurfaceRole::Popup => "popup",
        }
    }
}
