//! Geometry carried on output records
//!
//! Just enough shape to evaluate envelope-level spatial filters. No
//! coordinate reprojection and no spatial indexing happen here.

/// An axis-aligned bounding box in lon/lat order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Envelope of a single point
    pub fn from_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Grows the envelope to include a coordinate
    pub fn expand_to_include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// True when the two boxes share any area (edges count)
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

/// Record geometry, assembled by the upstream parser
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// lon, lat
    Point(f64, f64),
    LineString(Vec<(f64, f64)>),
    /// Outer ring first, inner rings after
    Polygon(Vec<Vec<(f64, f64)>>),
}

impl Geometry {
    /// Bounding box of the geometry; `None` for empty coordinate lists
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            Geometry::Point(x, y) => Some(Envelope::from_point(*x, *y)),
            Geometry::LineString(coords) => envelope_of(coords.iter().copied()),
            Geometry::Polygon(rings) => {
                envelope_of(rings.iter().flat_map(|ring| ring.iter().copied()))
            }
        }
    }
}

fn envelope_of(mut coords: impl Iterator<Item = (f64, f64)>) -> Option<Envelope> {
    let (x0, y0) = coords.next()?;
    let mut env = Envelope::from_point(x0, y0);
    for (x, y) in coords {
        env.expand_to_include(x, y);
    }
    Some(env)
}
