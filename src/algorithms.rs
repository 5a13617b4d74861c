//! Ordered candidate algorithms of a collective.

use crate::core::constants::IGNORED_ALGORITHM;
use crate::core::error::{Result, TunerError};
use crate::core::types::AlgorithmId;
use std::path::Path;

/// Candidate algorithm names indexed by [`AlgorithmId`]. Index 0 is the
/// default algorithm and the normalization reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmTable {
    collective: String,
    names: Vec<String>,
}

impl AlgorithmTable {
    /// Build a table from an ordered list of names.
    pub fn new<S: Into<String>>(collective: S, names: Vec<String>) -> Result<Self> {
        let collective = collective.into();
        if names.is_empty() {
            return Err(crate::config_error!(
                "No algorithms listed for collective '{}'",
                collective
            ));
        }
        Ok(AlgorithmTable { collective, names })
    }

    /// Read the table of `collective` from a headerless CSV file whose rows are
    /// `collective,alg0,alg1,...`. The `smp` pseudo-algorithm is dropped and the
    /// last matching row wins.
    pub fn from_csv<P: AsRef<Path>>(path: P, collective: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_ref())?;

        let mut found = None;
        for record in reader.records() {
            let record = record?;
            if record.get(0) == Some(collective) {
                found = Some(
                    record
                        .iter()
                        .skip(1)
                        .map(str::trim)
                        .filter(|name| !name.is_empty() && *name != IGNORED_ALGORITHM)
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                );
            }
        }

        match found {
            Some(names) => {
                log::debug!("{} candidate algorithms for {}: {:?}", names.len(), collective, names);
                Self::new(collective, names)
            }
            None => Err(crate::config_error!(
                "Collective '{}' not found in {}",
                collective,
                path.as_ref().display()
            )),
        }
    }

    /// Collective this table belongs to.
    pub fn collective(&self) -> &str {
        &self.collective
    }

    /// Number of candidate algorithms.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of an algorithm id.
    pub fn name(&self, id: AlgorithmId) -> Result<&str> {
        self.names.get(id).map(String::as_str).ok_or_else(|| {
            TunerError::invalid_parameter(
                "algorithm",
                id.to_string(),
                format!("{} has {} algorithms", self.collective, self.names.len()),
            )
        })
    }

    /// Names in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scatter,binomial").unwrap();
        writeln!(
            file,
            "bcast,scatter_recursive_doubling_allgather,binomial,smp,scatter_ring_allgather"
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "allreduce,recursive_doubling,reduce_scatter_allgather,tree2").unwrap();
        file
    }

    #[test]
    fn test_read_table_drops_smp() {
        let file = table_file();
        let table = AlgorithmTable::from_csv(file.path(), "bcast").unwrap();
        assert_eq!(
            table.names(),
            &[
                "scatter_recursive_doubling_allgather".to_string(),
                "binomial".to_string(),
                "scatter_ring_allgather".to_string()
            ]
        );
        assert_eq!(table.name(1).unwrap(), "binomial");
        assert!(table.name(3).is_err());
    }

    #[test]
    fn test_single_algorithm_collective() {
        let file = table_file();
        let table = AlgorithmTable::from_csv(file.path(), "scatter").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_collective_is_config_error() {
        let file = table_file();
        let err = AlgorithmTable::from_csv(file.path(), "alltoallw").unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
