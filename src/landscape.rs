/*!
The external description of the landscape: named raster layers of equal
shape, already loaded into memory, and the mapping between grid cells and
projected map coordinates. Reading rasters from disk and geodetic
reprojection happen elsewhere.
*/
use crate::error::{Error, Result};
use crate::Coords;
use serde_derive::{Deserialize, Serialize};

/// Sentinel for water and missing data in input layers.
pub const NO_DATA: f64 = -9999.;

pub fn is_no_data(v: f64) -> bool {
    v == NO_DATA || v.is_nan()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Row-major, `width * height` values.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landscape {
    pub width: usize,
    pub height: usize,
    pub layers: Vec<Layer>,
}

impl Landscape {
    pub fn new(width: usize, height: usize) -> Self {
        Landscape {
            width,
            height,
            layers: vec![],
        }
    }

    /// Add a layer given as `[row][col]`.
    pub fn add_layer(&mut self, name: impl Into<String>, rows: Vec<Vec<f64>>) -> Result<()> {
        let name = name.into();
        let found = rows.iter().map(Vec::len).sum();
        if rows.len() != self.height || rows.iter().any(|r| r.len() != self.width) {
            return Err(Error::LayerShape {
                name,
                expected: self.width * self.height,
                found,
            });
        }
        self.layers.push(Layer {
            name,
            values: rows.into_iter().flatten().collect(),
        });
        Ok(())
    }

    pub fn with_layer(mut self, name: impl Into<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        self.add_layer(name, rows)?;
        Ok(self)
    }

    pub fn layer(&self, name: &str) -> Result<&Layer> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))
    }

    /// Layers deserialized from elsewhere may have any length.
    pub fn validate(&self) -> Result<()> {
        for layer in &self.layers {
            if layer.values.len() != self.width * self.height {
                return Err(Error::LayerShape {
                    name: layer.name.clone(),
                    expected: self.width * self.height,
                    found: layer.values.len(),
                });
            }
        }
        Ok(())
    }
}

pub trait CoordinateTransform {
    /// Projected coordinates of the cell's corner.
    fn to_projected(&self, c: Coords) -> (f64, f64);
    /// The cell containing a projected point. It may lie outside the grid.
    fn to_cell(&self, x: f64, y: f64) -> Coords;
}

/**
An axis-aligned raster in a projected (equal-area) coordinate system, with
rows running from north to south.

```rust
# use model::landscape::{CoordinateTransform, LinearTransform};
# use model::Coords;
let t = LinearTransform { west: 0., north: 100., cell_size: 10. };
assert_eq!(t.to_projected(Coords::new(2, 3)), (20., 70.));
assert_eq!(t.to_cell(25., 65.), Coords::new(2, 3));
assert_eq!(t.to_cell(-5., 65.), Coords::new(-1, 3));
```
*/
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTransform {
    pub west: f64,
    pub north: f64,
    pub cell_size: f64,
}

impl Default for LinearTransform {
    /// 10 km cells of the South American Albers equal-area raster.
    fn default() -> Self {
        LinearTransform {
            west: -2_985_163.8955,
            north: 5_227_968.786,
            cell_size: 10_000.,
        }
    }
}

impl CoordinateTransform for LinearTransform {
    fn to_projected(&self, c: Coords) -> (f64, f64) {
        (
            self.west + f64::from(c.x) * self.cell_size,
            self.north - f64::from(c.y) * self.cell_size,
        )
    }

    fn to_cell(&self, x: f64, y: f64) -> Coords {
        Coords::new(
            ((x - self.west) / self.cell_size).floor() as i32,
            ((self.north - y) / self.cell_size).floor() as i32,
        )
    }
}
