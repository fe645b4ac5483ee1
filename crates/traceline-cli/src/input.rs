//! Input collection: files or stdin.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;

pub struct Source {
    pub name: String,
    pub sql: String,
}

/// Reads every input file, or stdin when no files were given.
pub fn read_input(files: &[PathBuf]) -> Result<Vec<Source>> {
    if files.is_empty() {
        let mut sql = String::new();
        std::io::stdin()
            .read_to_string(&mut sql)
            .context("failed to read stdin")?;
        return Ok(vec![Source {
            name: "<stdin>".to_string(),
            sql,
        }]);
    }

    files
        .iter()
        .map(|path| {
            let sql = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Source {
                name: path.display().to_string(),
                sql,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.sql");
        let b = dir.path().join("b.sql");
        std::fs::File::create(&a)
            .unwrap()
            .write_all(b"SELECT 1")
            .unwrap();
        std::fs::File::create(&b)
            .unwrap()
            .write_all(b"SELECT 2")
            .unwrap();

        let sources = read_input(&[a, b]).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].sql, "SELECT 1");
        assert_eq!(sources[1].sql, "SELECT 2");
    }

    #[test]
    fn missing_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/x.sql");
        assert!(read_input(&[missing]).is_err());
    }
}
