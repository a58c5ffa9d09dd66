use crate::structs::{ConsensusError, CsvData, FeatureMatrix, Result};
use ndarray::Array2;

impl FeatureMatrix {
    /// Extract numeric features from CSV data
    ///
    /// Rows with a missing or non-numeric value in any feature column are
    /// skipped; `row_indices` maps the kept rows back to the file.
    ///
    /// # Errors
    /// Returns error if no numeric columns or no complete rows are found
    pub fn from_csv(csv: &CsvData) -> Result<Self> {
        let numeric_cols = csv.numeric_column_indices();

        if numeric_cols.is_empty() {
            return Err(ConsensusError::Config("No numeric columns found".into()));
        }

        let names: Vec<String> = numeric_cols
            .iter()
            .filter_map(|&i| csv.headers.get(i).cloned())
            .collect();

        let mut data = Vec::new();
        let mut row_indices = Vec::new();

        for (row_idx, row) in csv.rows.iter().enumerate() {
            let features: Option<Vec<f64>> = numeric_cols
                .iter()
                .map(|&col_idx| row.get(col_idx).and_then(|v| v.parse::<f64>().ok()))
                .collect();

            if let Some(features) = features.filter(|f| f.iter().all(|v| v.is_finite())) {
                data.push(features);
                row_indices.push(row_idx);
            }
        }

        if data.is_empty() {
            return Err(ConsensusError::Config(
                "No complete rows with numeric data".into(),
            ));
        }

        Ok(Self {
            names,
            data,
            row_indices,
        })
    }

    /// Dense `n_samples x n_features` array for the clustering core
    ///
    /// # Errors
    /// Returns error if the rows are ragged
    pub fn to_array(&self) -> Result<Array2<f64>> {
        Array2::from_shape_vec((self.n_samples(), self.n_features()), self.to_flat())
            .map_err(|e| ConsensusError::Config(format!("Failed to create array: {e}")))
    }
}
