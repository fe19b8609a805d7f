//! JSON scene and result files.
//!
//! Surfaces are written as indexed meshes:
//!
//! ```json
//! { "vertices": [[0, 0, 0], [10, 0, 0], [10, 10, 0]], "triangles": [[0, 1, 2]] }
//! ```
//!
//! A surface with no `triangles` is treated as scattered points.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fault_connect::{ConnectParams, IntersectionLine, SurfaceSnapshot, TriMesh};
use nalgebra::Point3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Indexed surface as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    #[serde(default)]
    pub vertices: Vec<[f64; 3]>,
    #[serde(default)]
    pub triangles: Vec<[usize; 3]>,
}

impl MeshData {
    pub fn from_trimesh(mesh: &TriMesh) -> Self {
        let (positions, faces) = mesh.to_indexed();
        Self {
            vertices: positions.iter().map(|p| [p.x, p.y, p.z]).collect(),
            triangles: faces,
        }
    }

    /// Vertices without connectivity.
    pub fn is_scattered(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn points(&self) -> Vec<Point3<f64>> {
        self.vertices
            .iter()
            .map(|&[x, y, z]| Point3::new(x, y, z))
            .collect()
    }

    pub fn to_trimesh(&self) -> Result<TriMesh> {
        TriMesh::from_indexed(&self.points(), &self.triangles)
            .context("Surface triangles reference missing vertices")
    }
}

/// One fault of a connect scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInput {
    pub id: i32,
    #[serde(flatten)]
    pub surface: MeshData,
    /// Known best-fit plane as unit normal then origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plane: Option<[f64; 6]>,
}

/// Input of the `connect` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectScene {
    pub detachment: MeshData,
    #[serde(default)]
    pub faults: Vec<FaultInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_spacing: Option<f64>,
    #[serde(default)]
    pub params: ConnectParams,
}

/// Input of the `bracket` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketScene {
    pub lower: MeshData,
    pub upper: MeshData,
    pub lower_age: f64,
    pub upper_age: f64,
    pub age: f64,
    #[serde(default)]
    pub params: ConnectParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceOutput {
    pub id: i32,
    #[serde(flatten)]
    pub surface: MeshData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plane: Option<[f64; 6]>,
}

impl From<&SurfaceSnapshot> for SurfaceOutput {
    fn from(snapshot: &SurfaceSnapshot) -> Self {
        Self {
            id: snapshot.id,
            surface: MeshData::from_trimesh(&snapshot.mesh),
            plane: snapshot.plane.map(|p| p.to_wire()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactLine {
    pub fault_id: i32,
    pub points: Vec<[f64; 3]>,
}

impl From<&IntersectionLine> for ContactLine {
    fn from(line: &IntersectionLine) -> Self {
        Self {
            fault_id: line.fault_id,
            points: line.points.iter().map(|p| [p.x, p.y, p.z]).collect(),
        }
    }
}

/// Output of the `connect` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectOutput {
    pub detachment: SurfaceOutput,
    pub faults: Vec<SurfaceOutput>,
    pub contact_lines: Vec<ContactLine>,
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))
}
