//! Particle catalog table.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One extracted particle: dataset identity, object id, source and output
/// paths, and the box left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub identifier: String,
    pub group_name: String,
    pub id: i32,
    pub tomo_path: PathBuf,
    pub particle_path: PathBuf,
    pub left_corner_x: usize,
    pub left_corner_y: usize,
    pub left_corner_z: usize,
}

/// Append-only table of extracted particles, one row per (dataset, object).
///
/// Rows are appended in dataset/object iteration order; the core never
/// mutates or reorders them. Serialization to any tabular format is the
/// caller's choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticleCatalog {
    rows: Vec<CatalogRow>,
}

impl ParticleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: CatalogRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_keep_append_order() {
        let mut catalog = ParticleCatalog::new();
        for id in [4, 1, 9] {
            catalog.push(CatalogRow {
                identifier: "exp_1".into(),
                group_name: "ctrl".into(),
                id,
                tomo_path: "tomo.mrc".into(),
                particle_path: format!("exp_1_id-{}.mrc", id).into(),
                left_corner_x: 0,
                left_corner_y: 0,
                left_corner_z: 0,
            });
        }
        let ids: Vec<i32> = catalog.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 1, 9]);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn serializes_with_column_names() {
        let mut catalog = ParticleCatalog::new();
        catalog.push(CatalogRow {
            identifier: "exp_1".into(),
            group_name: "ctrl".into(),
            id: 12,
            tomo_path: "tomo.mrc".into(),
            particle_path: "exp_1_id-12.mrc".into(),
            left_corner_x: 90,
            left_corner_y: 45,
            left_corner_z: 0,
        });
        let json = serde_json::to_string(&catalog).unwrap();
        assert!(json.contains("\"left_corner_x\":90"));
        assert!(json.contains("\"group_name\":\"ctrl\""));

        let back: ParticleCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rows(), catalog.rows());
    }
}
