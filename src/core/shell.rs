//! xdg-shell bookkeeping that is not surface state.

use crate::core::types::Rect;

/// Accumulated `xdg_positioner` rules. Consumed by `get_popup` to place
/// the popup relative to its parent.
#[derive(Debug, Default, Clone, Copy)]
pub struct Positioner {
    pub size: Option<(i32, i32)>,
    pub anchor_rect: Option<Rect>,
    pub anchor: u32,
    pub gravity: u32,
    pub constraint_adjustment: u32,
    pub offset: (i32, i32),
}

impl Positioner {
    /// The popup geometry this positioner produces. The placement rules
    /// beyond anchor-rect origin plus offset are not applied yet.
    pub fn resolve(&self) -> Rect {
        let (width, height) = self.size.unwrap_or((0, 0));
        let origin = self
            .anchor_rect
            .map(|r| (r.x + self.offset.0, r.y + self.offset.1))
            .unwrap_or(self.offset);
        Rect::new(origin.0, origin.1, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positioner_resolves_offset_placement() {
        let mut positioner = Positioner::default();
        positioner.size = Some((200, 100));
        positioner.anchor_rect = Some(Rect::new(10, 20, 50, 50));
        positioner.offset = (5, 5);
        assert_eq!(positioner.resolve(), Rect::new(15, 25, 200, 100));
    }
}
