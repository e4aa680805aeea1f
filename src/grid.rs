//! Raster and vector grid payload model.
//!
//! Grids are row-major, north-to-south: index `(yi, xi)` at `yi * nx + xi`
//! holds the cell at latitude `la1 - yi * dy` and longitude `lo1 + xi * dx`.
//! Missing cells serialize as JSON `null`. Longitude layout may be either
//! `-180..180` or `0..360`; the invariant is that `lo1` is the west edge and
//! `dx > 0`.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Regular lat/lon mesh description shared by raster and vector grids.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
	/// Number of columns.
	pub nx: usize,
	/// Number of rows.
	pub ny: usize,
	/// Longitude of the west edge.
	pub lo1: f64,
	/// Latitude of the north edge.
	pub la1: f64,
	/// Column step in degrees (positive, eastward).
	pub dx: f64,
	/// Row step in degrees (positive, southward).
	pub dy: f64,
}
impl GridHeader {
	/// Validate the mesh invariants.
	pub fn validate(&self) -> Result<()> {
		if self.nx == 0 || self.ny == 0 {
			return Err(Error::Validation {
				field: "grid.header",
				reason: "nx and ny must be non-zero.".into(),
			});
		}
		if self.dx <= 0.0 || self.dy <= 0.0 {
			return Err(Error::Validation {
				field: "grid.header",
				reason: "dx and dy must be positive.".into(),
			});
		}

		Ok(())
	}

	/// Flat index of the cell at row `yi`, column `xi`.
	pub fn index(&self, yi: usize, xi: usize) -> usize {
		yi * self.nx + xi
	}

	/// Latitude of row `yi`.
	pub fn lat_of(&self, yi: usize) -> f64 {
		self.la1 - yi as f64 * self.dy
	}

	/// Longitude of column `xi`.
	pub fn lon_of(&self, xi: usize) -> f64 {
		self.lo1 + xi as f64 * self.dx
	}
}

/// Scalar grid payload (temperature, humidity, wave height, ...).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RasterGrid {
	/// Mesh description.
	pub header: GridHeader,
	/// Row-major cell values; `None` marks a missing cell.
	pub data: Vec<Option<f64>>,
	/// Physical unit of the cell values.
	pub unit: String,
	/// Display name of the layer.
	pub name: String,
}
impl RasterGrid {
	/// Construct a raster grid, enforcing `data.len() == nx * ny`.
	pub fn new(
		header: GridHeader,
		data: Vec<Option<f64>>,
		unit: impl Into<String>,
		name: impl Into<String>,
	) -> Result<Self> {
		header.validate()?;

		if data.len() != header.nx * header.ny {
			return Err(Error::Validation {
				field: "grid.data",
				reason: format!(
					"Expected {} cells ({}x{}), got {}.",
					header.nx * header.ny,
					header.nx,
					header.ny,
					data.len()
				),
			});
		}

		Ok(Self { header, data, unit: unit.into(), name: name.into() })
	}

	/// Value at row `yi`, column `xi`.
	pub fn get(&self, yi: usize, xi: usize) -> Option<f64> {
		self.data.get(self.header.index(yi, xi)).copied().flatten()
	}
}

/// Two-component grid payload (wind, ocean currents) sharing one header.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorGrid {
	/// Mesh description shared by both components.
	pub header: GridHeader,
	/// Eastward component, row-major.
	pub u: Vec<Option<f64>>,
	/// Northward component, row-major.
	pub v: Vec<Option<f64>>,
	/// Physical unit of the components.
	pub unit: String,
	/// Display name of the layer.
	pub name: String,
}
impl VectorGrid {
	/// Construct a vector grid; both components must fill the mesh.
	pub fn new(
		header: GridHeader,
		u: Vec<Option<f64>>,
		v: Vec<Option<f64>>,
		unit: impl Into<String>,
		name: impl Into<String>,
	) -> Result<Self> {
		header.validate()?;

		let cells = header.nx * header.ny;

		if u.len() != cells || v.len() != cells {
			return Err(Error::Validation {
				field: "grid.data",
				reason: format!(
					"Expected {cells} cells per component, got u={} v={}.",
					u.len(),
					v.len()
				),
			});
		}

		Ok(Self { header, u, v, unit: unit.into(), name: name.into() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn header() -> GridHeader {
		GridHeader { nx: 4, ny: 3, lo1: -180.0, la1: 90.0, dx: 90.0, dy: 60.0 }
	}

	#[test]
	fn indexing_walks_north_to_south_west_to_east() {
		let header = header();

		assert_eq!(header.index(0, 0), 0);
		assert_eq!(header.index(2, 3), 11);
		assert_eq!(header.lat_of(0), 90.0);
		assert_eq!(header.lat_of(2), -30.0);
		assert_eq!(header.lon_of(0), -180.0);
		assert_eq!(header.lon_of(3), 90.0);
	}

	#[test]
	fn raster_rejects_cell_count_mismatch() {
		let grid = RasterGrid::new(header(), vec![Some(1.0); 11], "K", "temperature");

		assert!(grid.is_err());
		assert!(RasterGrid::new(header(), vec![None; 12], "K", "temperature").is_ok());
	}

	#[test]
	fn missing_cells_serialize_as_null() {
		let grid =
			RasterGrid::new(header(), vec![None; 12], "K", "temperature").expect("grid");
		let json = serde_json::to_value(&grid).expect("json");

		assert_eq!(json["data"][0], serde_json::Value::Null);
		assert_eq!(json["header"]["nx"], 4);
	}

	#[test]
	fn vector_requires_both_components_full() {
		let grid = VectorGrid::new(header(), vec![Some(1.0); 12], vec![Some(2.0); 11], "m/s", "wind");

		assert!(grid.is_err());
	}
}
