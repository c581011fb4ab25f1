use crate::{floating_type_mod::FT, vec3f, V};

pub type Color = V<FT, 3>;

/// Piecewise linear map from a scalar to an RGB color (components in `[0, 1]`).
pub struct ColorMap {
    insertions: Vec<(FT, Color)>,
}

impl ColorMap {
    pub fn new(mut insertions: Vec<(FT, Color)>) -> Self {
        assert!(!insertions.is_empty(), "color map needs at least one color stop");
        insertions.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { insertions }
    }

    /// Deep blue for under-dense particles, white for strongly compressed ones.
    pub fn water() -> Self {
        Self::new(vec![
            (0.0, vec3f(0.05, 0.15, 0.45)),
            (0.5, vec3f(0.10, 0.45, 0.85)),
            (0.8, vec3f(0.45, 0.80, 0.95)),
            (1.0, vec3f(0.95, 0.98, 1.00)),
        ])
    }

    pub fn get(&self, x: FT) -> Color {
        let (first, last) = (self.insertions[0], self.insertions[self.insertions.len() - 1]);
        if x.is_nan() || x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        for w in self.insertions.windows(2) {
            let ((x0, c0), (x1, c1)) = (w[0], w[1]);
            if x >= x0 && x <= x1 {
                let interp = (x - x0) / (x1 - x0);
                return c0 + (c1 - c0) * interp;
            }
        }

        last.1
    }

    /// Color of `value` after mapping `[min, max]` linearly onto `[0, 1]`.
    pub fn get_normalized(&self, value: FT, min: FT, max: FT) -> Color {
        if max <= min {
            return self.get(0.);
        }
        self.get((value - min) / (max - min))
    }

    pub fn get_u8(&self, x: FT) -> V<u8, 3> {
        self.get(x).map(|f| (f.clamp(0., 1.) * 255.).round() as u8)
    }

    /// `#rrggbb` notation, as used in SVG attributes.
    pub fn get_hex(&self, x: FT) -> String {
        let c = self.get_u8(x);
        format!("#{:02x}{:02x}{:02x}", c.x, c.y, c.z)
    }
}

#[test]
fn color_map_interpolates_between_stops() {
    let map = ColorMap::new(vec![(1.0, vec3f(1., 1., 1.)), (0.0, vec3f(0., 0., 0.))]);
    assert_eq!(map.get(-3.), vec3f(0., 0., 0.));
    assert_eq!(map.get(7.), vec3f(1., 1., 1.));
    assert_eq!(map.get(0.25), vec3f(0.25, 0.25, 0.25));
    assert_eq!(map.get(FT::NAN), vec3f(0., 0., 0.));

    assert_eq!(map.get_u8(1.), V::<u8, 3>::from([255, 255, 255]));
    assert_eq!(map.get_hex(0.), "#000000");
    assert_eq!(map.get_hex(1.), "#ffffff");
    assert_eq!(map.get_normalized(15., 10., 20.), vec3f(0.5, 0.5, 0.5));
    assert_eq!(map.get_normalized(15., 20., 20.), vec3f(0., 0., 0.));
}
