//! Label table loading

use std::io::BufRead;
use std::ops::Index;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::InferenceError;

/// Ordered class names; entry `i` names output score `i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Arc<[String]>,
}

impl LabelTable {
    /// Read one label per line. Blank lines are kept so indices stay aligned.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, InferenceError> {
        let labels = reader
            .lines()
            .map(|line| line.map(|l| l.trim_end_matches('\r').to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from(labels))
    }

    /// Load a newline-delimited label file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(std::io::BufReader::new(file))?;
        info!("Loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Check the table against the model's output width
    pub fn ensure_width(&self, outputs: usize) -> Result<(), InferenceError> {
        if self.len() != outputs {
            return Err(InferenceError::LabelMismatch {
                labels: self.len(),
                outputs,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for LabelTable {
    fn from(labels: Vec<String>) -> Self {
        Self {
            labels: labels.into(),
        }
    }
}

impl<'a> FromIterator<&'a str> for LabelTable {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(str::to_string).collect::<Vec<_>>())
    }
}

impl Index<usize> for LabelTable {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.labels[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_lines_in_order() {
        let table = LabelTable::from_reader("background\ntench\ngoldfish\n".as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(&table[1], "tench");
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let table = LabelTable::from_reader("cat\r\n\r\ndog".as_bytes()).unwrap();
        let labels: Vec<_> = table.iter().collect();
        assert_eq!(labels, vec!["cat", "", "dog"]);
    }

    #[test]
    fn test_width_mismatch() {
        let table: LabelTable = ["cat", "dog"].into_iter().collect();
        assert!(table.ensure_width(2).is_ok());
        let err = table.ensure_width(1001).unwrap_err();
        assert!(matches!(err, InferenceError::LabelMismatch { labels: 2, outputs: 1001 }));
    }

    #[test]
    fn test_missing_file() {
        let err = LabelTable::load("/nonexistent/labels.txt").unwrap_err();
        assert!(matches!(err, InferenceError::Io(_)));
    }
}
