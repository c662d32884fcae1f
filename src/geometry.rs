//! Decoding of GeoPackage geometry blobs into `geo` types.
//!
//! A blob is either a GeoPackage binary (`GP` header, optional envelope,
//! then WKB) or bare WKB.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon, SimplifyVwPreserve,
};
use thiserror::Error;

const GPKG_MAGIC: &[u8; 2] = b"GP";
const GPKG_HEADER_LEN: usize = 8;
const GPKG_EMPTY_FLAG: u8 = 0b0001_0000;

// EWKB flag bits.
const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("blob too short ({0} bytes)")]
    TooShort(usize),
    #[error("unknown envelope indicator {0}")]
    UnknownEnvelope(u8),
    #[error("invalid WKB byte order marker {0:#04x}")]
    InvalidByteOrder(u8),
    #[error("unsupported WKB geometry type {0}")]
    UnsupportedType(u32),
    #[error("WKB data truncated")]
    Truncated,
    #[error("empty geometry")]
    Empty,
}

/// Envelope size in bytes for the indicator stored in bits 1..=3 of the flags.
fn envelope_size(indicator: u8) -> Result<usize, GeometryError> {
    match indicator {
        0 => Ok(0),
        1 => Ok(32),
        2 | 3 => Ok(48),
        4 => Ok(64),
        other => Err(GeometryError::UnknownEnvelope(other)),
    }
}

/// Returns the WKB part of a blob.
pub fn wkb_payload(blob: &[u8]) -> Result<&[u8], GeometryError> {
    if blob.len() < 2 || &blob[..2] != GPKG_MAGIC {
        return Ok(blob);
    }
    if blob.len() < GPKG_HEADER_LEN {
        return Err(GeometryError::TooShort(blob.len()));
    }
    let flags = blob[3];
    if flags & GPKG_EMPTY_FLAG != 0 {
        return Err(GeometryError::Empty);
    }
    let start = GPKG_HEADER_LEN + envelope_size((flags & 0x0E) >> 1)?;
    blob.get(start..).ok_or(GeometryError::TooShort(blob.len()))
}

pub fn decode(blob: &[u8]) -> Result<Geometry<f64>, GeometryError> {
    let mut reader = WkbReader { data: wkb_payload(blob)?, pos: 0 };
    reader.geometry()
}

/// Decodes and, for polygonal shapes, simplifies.
pub fn decode_simplified(blob: &[u8], tolerance: f64) -> Result<Geometry<f64>, GeometryError> {
    let geometry = decode(blob)?;
    Ok(simplify(geometry, tolerance))
}

/// Topology-preserving simplification of Polygon/MultiPolygon; other
/// shapes pass through. `tolerance` is in coordinate units and is squared
/// into the Visvalingam-Whyatt area threshold.
pub fn simplify(geometry: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    if tolerance <= 0.0 {
        return geometry;
    }
    // Visvalingam-Whyatt thresholds on triangle area.
    let epsilon = tolerance * tolerance;
    match geometry {
        Geometry::Polygon(p) => Geometry::Polygon(p.simplify_vw_preserve(&epsilon)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.simplify_vw_preserve(&epsilon)),
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
enum ByteOrder {
    Big,
    Little,
}

struct WkbReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl WkbReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], GeometryError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or(GeometryError::Truncated)?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn byte_order(&mut self) -> Result<ByteOrder, GeometryError> {
        match self.take::<1>()?[0] {
            0 => Ok(ByteOrder::Big),
            1 => Ok(ByteOrder::Little),
            other => Err(GeometryError::InvalidByteOrder(other)),
        }
    }

    fn u32(&mut self, order: ByteOrder) -> Result<u32, GeometryError> {
        let bytes = self.take::<4>()?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        })
    }

    fn f64(&mut self, order: ByteOrder) -> Result<f64, GeometryError> {
        let bytes = self.take::<8>()?;
        Ok(match order {
            ByteOrder::Big => f64::from_be_bytes(bytes),
            ByteOrder::Little => f64::from_le_bytes(bytes),
        })
    }

    /// Count prefix, checked against the bytes left so a corrupt length
    /// cannot trigger a huge allocation.
    fn count(&mut self, order: ByteOrder, min_item_len: usize) -> Result<usize, GeometryError> {
        let n = self.u32(order)? as usize;
        let remaining = self.data.len() - self.pos;
        if n.saturating_mul(min_item_len) > remaining {
            return Err(GeometryError::Truncated);
        }
        Ok(n)
    }

    fn coord(&mut self, order: ByteOrder, dims: usize) -> Result<Coord<f64>, GeometryError> {
        let x = self.f64(order)?;
        let y = self.f64(order)?;
        for _ in 2..dims {
            self.f64(order)?;
        }
        Ok(Coord { x, y })
    }

    fn line_string(&mut self, order: ByteOrder, dims: usize) -> Result<LineString<f64>, GeometryError> {
        let n = self.count(order, dims * 8)?;
        let coords = (0..n)
            .map(|_| self.coord(order, dims))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LineString::new(coords))
    }

    fn polygon(&mut self, order: ByteOrder, dims: usize) -> Result<Polygon<f64>, GeometryError> {
        let n = self.count(order, 4)?;
        let mut rings = (0..n)
            .map(|_| self.line_string(order, dims))
            .collect::<Result<Vec<_>, _>>()?;
        if rings.is_empty() {
            return Ok(Polygon::new(LineString::new(vec![]), vec![]));
        }
        let exterior = rings.remove(0);
        Ok(Polygon::new(exterior, rings))
    }

    /// Members of a multi-geometry each carry their own header.
    fn members(&mut self, order: ByteOrder) -> Result<Vec<Geometry<f64>>, GeometryError> {
        let n = self.count(order, 5)?;
        (0..n).map(|_| self.geometry()).collect()
    }

    fn geometry(&mut self) -> Result<Geometry<f64>, GeometryError> {
        let order = self.byte_order()?;
        let raw_type = self.u32(order)?;
        let mut dims = 2;
        if raw_type & EWKB_Z != 0 {
            dims += 1;
        }
        if raw_type & EWKB_M != 0 {
            dims += 1;
        }
        if raw_type & EWKB_SRID != 0 {
            self.u32(order)?;
        }
        let iso_type = raw_type & 0x0FFF_FFFF;
        let (base, extra) = (iso_type % 1000, iso_type / 1000);
        dims += match extra {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(GeometryError::UnsupportedType(raw_type)),
        };

        match base {
            1 => Ok(Geometry::Point(Point::from(self.coord(order, dims)?))),
            2 => Ok(Geometry::LineString(self.line_string(order, dims)?)),
            3 => Ok(Geometry::Polygon(self.polygon(order, dims)?)),
            4 => {
                let points = self
                    .members(order)?
                    .into_iter()
                    .filter_map(|g| Point::try_from(g).ok())
                    .collect::<Vec<_>>();
                Ok(Geometry::MultiPoint(MultiPoint::new(points)))
            }
            5 => {
                let lines = self
                    .members(order)?
                    .into_iter()
                    .filter_map(|g| LineString::try_from(g).ok())
                    .collect::<Vec<_>>();
                Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
            }
            6 => {
                let polygons = self
                    .members(order)?
                    .into_iter()
                    .filter_map(|g| Polygon::try_from(g).ok())
                    .collect::<Vec<_>>();
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
            7 => Ok(Geometry::GeometryCollection(GeometryCollection(self.members(order)?))),
            _ => Err(GeometryError::UnsupportedType(raw_type)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]
    }

    #[test]
    fn bare_wkb_point() {
        let geom = decode(&wkb::point(-64.2, -31.4)).unwrap();
        assert_eq!(geom, Geometry::Point(Point::new(-64.2, -31.4)));
    }

    #[test]
    fn every_envelope_size() {
        for indicator in 0..=4 {
            let blob = wkb::gpkg(indicator, &wkb::polygon(&square()));
            let geom = decode(&blob).unwrap();
            match geom {
                Geometry::Polygon(p) => assert_eq!(p.exterior().0.len(), 5),
                other => panic!("expected polygon, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_envelope_is_error() {
        let mut blob = wkb::gpkg(0, &wkb::point(1.0, 2.0));
        blob[3] = (5 << 1) | 1;
        assert_eq!(decode(&blob), Err(GeometryError::UnknownEnvelope(5)));
    }

    #[test]
    fn empty_flag_is_error() {
        let mut blob = wkb::gpkg(0, &wkb::point(1.0, 2.0));
        blob[3] |= GPKG_EMPTY_FLAG;
        assert_eq!(decode(&blob), Err(GeometryError::Empty));
    }

    #[test]
    fn truncated_input_is_error() {
        let blob = wkb::polygon(&square());
        assert_eq!(decode(&blob[..blob.len() - 3]), Err(GeometryError::Truncated));
        assert_eq!(decode(b"GP\0"), Err(GeometryError::TooShort(3)));
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn big_endian_multipolygon() {
        let mut blob = vec![0u8];
        blob.extend_from_slice(&6u32.to_be_bytes());
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.push(0);
        blob.extend_from_slice(&3u32.to_be_bytes());
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.extend_from_slice(&4u32.to_be_bytes());
        for (x, y) in [(0.0f64, 0.0f64), (2.0, 0.0), (0.0, 2.0), (0.0, 0.0)] {
            blob.extend_from_slice(&x.to_be_bytes());
            blob.extend_from_slice(&y.to_be_bytes());
        }
        match decode(&blob).unwrap() {
            Geometry::MultiPolygon(mp) => {
                assert_eq!(mp.0.len(), 1);
                assert_eq!(mp.0[0].exterior().0[1], Coord { x: 2.0, y: 0.0 });
            }
            other => panic!("expected multipolygon, got {other:?}"),
        }
    }

    #[test]
    fn iso_z_point_drops_z() {
        let mut blob = vec![1u8];
        blob.extend_from_slice(&1001u32.to_le_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode(&blob).unwrap(), Geometry::Point(Point::new(1.0, 2.0)));
    }

    #[test]
    fn simplify_only_touches_polygons() {
        let mut ring: Vec<(f64, f64)> = (0..=100).map(|i| (i as f64 / 100.0, 0.0)).collect();
        ring.extend([(1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
        let polygon = decode(&wkb::polygon(&ring)).unwrap();
        match simplify(polygon, 0.005) {
            Geometry::Polygon(p) => assert!(p.exterior().0.len() < ring.len()),
            other => panic!("expected polygon, got {other:?}"),
        }

        let point = Geometry::Point(Point::new(1.0, 1.0));
        assert_eq!(simplify(point.clone(), 0.005), point);
    }

    #[test]
    fn tolerance_is_squared_into_an_area() {
        // A bump of height h on the unit base spans a triangle of area h / 2.
        let ring_with_bump = |h: f64| {
            let ring = [(0.0, 0.0), (0.5, h), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)];
            decode(&wkb::polygon(&ring)).unwrap()
        };
        let vertices = |g: Geometry<f64>| match g {
            Geometry::Polygon(p) => p.exterior().0.len(),
            other => panic!("expected polygon, got {other:?}"),
        };
        // 0.005^2 = 2.5e-5
        assert_eq!(vertices(simplify(ring_with_bump(0.0001), 0.005)), 6);
        assert_eq!(vertices(simplify(ring_with_bump(0.00002), 0.005)), 5);
    }
}
