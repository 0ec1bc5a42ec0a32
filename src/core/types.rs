//! Small geometry types shared across the core.

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Extent { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An origin/extent rectangle in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    /// A rectangle with a zero extent carries no area and is rejected
    /// wherever geometry is applied.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOp {
    Add,
    Subtract,
}

/// A `wl_region`: an ordered list of add/subtract rectangles. The
/// compositor treats the contents as opaque; only identity matters for
/// the surface input/opaque slots.
#[derive(Debug, Default)]
pub struct Region {
    pub ops: Vec<(RegionOp, Rect)>,
}

impl Region {
    pub fn add(&mut self, rect: Rect) {
        self.ops.push((RegionOp::Add, rect));
    }

    pub fn subtract(&mut self, rect: Rect) {
        self.ops.push((RegionOp::Subtract, rect));
    }
}
