use crate::error::DesignError;
use crate::oracle::{CandidateResult, PrimerKey, PrimerSide};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

pub const CSV_HEADER: [&str; 2] = ["name", "sequence"];

fn open_output(path: &Path, append: bool) -> Result<File, DesignError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| DesignError::io(&path.display().to_string(), e))
}

fn write_rows(path: &Path, rows: &[(String, String)], append: bool) -> Result<(), DesignError> {
    let shown = path.display().to_string();
    let file = open_output(path, append)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if !append {
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| DesignError::csv(&shown, e))?;
    }
    for (name, sequence) in rows {
        writer
            .write_record([name, sequence])
            .map_err(|e| DesignError::csv(&shown, e))?;
    }
    writer.flush().map_err(|e| DesignError::io(&shown, e))
}

/// Writes one `name,sequence` row per returned primer sequence, in the
/// oracle's key order. The header is only written when not appending.
pub fn export_primers(
    path: impl AsRef<Path>,
    result: &CandidateResult,
    append: bool,
) -> Result<usize, DesignError> {
    let path = path.as_ref();
    let rows = result.sequence_rows();
    write_rows(path, &rows, append)?;
    debug!(rows = rows.len(), append, path = %path.display(), "exported primers");
    Ok(rows.len())
}

/// Reads a previously exported table, skipping its header row.
pub fn read_primer_table(path: impl AsRef<Path>) -> Result<Vec<(String, String)>, DesignError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    let file = File::open(path).map_err(|e| DesignError::io(&shown, e))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut rows = vec![];
    for record in reader.records() {
        let record = record.map_err(|e| DesignError::csv(&shown, e))?;
        match (record.get(0), record.get(1)) {
            (Some(name), Some(sequence)) => rows.push((name.to_string(), sequence.to_string())),
            _ => {
                return Err(DesignError::csv(
                    &shown,
                    format!("expected name and sequence columns, found {} field(s)", record.len()),
                ));
            }
        }
    }
    Ok(rows)
}

/// Copies the selected primers from `source` to `dest`: all requested forward
/// primers first, then all requested reverse primers.
///
/// Every name is resolved before `dest` is opened, so a missing index leaves
/// `dest` untouched.
pub fn prune_results(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    left_indices: &[usize],
    right_indices: &[usize],
    append: bool,
) -> Result<usize, DesignError> {
    let source = source.as_ref();
    let dest = dest.as_ref();
    let all: HashMap<String, String> = read_primer_table(source)?.into_iter().collect();

    let requested = left_indices
        .iter()
        .map(|&i| (PrimerSide::Left, i))
        .chain(right_indices.iter().map(|&i| (PrimerSide::Right, i)));
    let mut selected = Vec::with_capacity(left_indices.len() + right_indices.len());
    for (side, index) in requested {
        let name = PrimerKey::primer_name(side, index);
        let Some(sequence) = all.get(&name) else {
            return Err(DesignError::PrimerNotFound {
                name,
                path: source.display().to_string(),
            });
        };
        selected.push((name, sequence.clone()));
    }

    write_rows(dest, &selected, append)?;
    debug!(
        rows = selected.len(),
        source = %source.display(),
        dest = %dest.display(),
        "pruned primers"
    );
    Ok(selected.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::{fake_sequence, record_with};
    use std::fs;
    use tempfile::tempdir;

    fn result(left: &[f64], right: &[f64]) -> CandidateResult {
        CandidateResult::from_record(record_with(left, right)).unwrap()
    }

    #[test]
    fn test_export_writes_header_and_rows() {
        let td = tempdir().unwrap();
        let path = td.path().join("primers.csv");
        let written = export_primers(&path, &result(&[58.0, 59.0], &[58.5]), false).unwrap();
        assert_eq!(written, 3);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,sequence");
        assert_eq!(
            lines[1],
            format!("PRIMER_LEFT_0,{}", fake_sequence(PrimerSide::Left, 0))
        );
        assert!(lines[3].starts_with("PRIMER_RIGHT_0,"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_export_append_skips_header() {
        let td = tempdir().unwrap();
        let path = td.path().join("primers.csv");
        export_primers(&path, &result(&[58.0], &[58.5]), false).unwrap();
        export_primers(&path, &result(&[58.0], &[58.5]), true).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("name,sequence").count(), 1);
        assert_eq!(text.lines().count(), 5);

        // Overwriting starts over.
        export_primers(&path, &result(&[58.0], &[]), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_prune_round_trip() {
        let td = tempdir().unwrap();
        let source = td.path().join("all.csv");
        let dest = td.path().join("picked.csv");
        export_primers(&source, &result(&[58.0, 58.1, 58.2], &[59.0, 59.1]), false).unwrap();

        let written = prune_results(&source, &dest, &[0, 1, 2], &[0, 1], false).unwrap();
        assert_eq!(written, 5);
        assert_eq!(
            read_primer_table(&dest).unwrap(),
            read_primer_table(&source).unwrap()
        );
    }

    #[test]
    fn test_prune_groups_forward_then_reverse() {
        let td = tempdir().unwrap();
        let source = td.path().join("all.csv");
        let dest = td.path().join("picked.csv");
        export_primers(&source, &result(&[58.0, 58.1, 58.2], &[59.0, 59.1]), false).unwrap();

        prune_results(&source, &dest, &[2, 0], &[1], false).unwrap();
        let names: Vec<String> = read_primer_table(&dest)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, ["PRIMER_LEFT_2", "PRIMER_LEFT_0", "PRIMER_RIGHT_1"]);

        prune_results(&source, &dest, &[1], &[], true).unwrap();
        let text = fs::read_to_string(&dest).unwrap();
        assert_eq!(text.matches("name,sequence").count(), 1);
        assert!(text.trim_end().ends_with(&fake_sequence(PrimerSide::Left, 1)));
    }

    #[test]
    fn test_prune_missing_index_leaves_destination_alone() {
        let td = tempdir().unwrap();
        let source = td.path().join("all.csv");
        let dest = td.path().join("picked.csv");
        export_primers(&source, &result(&[58.0, 58.1, 58.2, 58.3], &[59.0]), false).unwrap();
        fs::write(&dest, "name,sequence\nPRIMER_LEFT_9,ACGT\n").unwrap();

        let err = prune_results(&source, &dest, &[0, 5], &[0], false).unwrap_err();
        assert!(matches!(
            err,
            DesignError::PrimerNotFound { ref name, .. } if name == "PRIMER_LEFT_5"
        ));
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            "name,sequence\nPRIMER_LEFT_9,ACGT\n"
        );

        let missing = td.path().join("never.csv");
        assert!(prune_results(&source, &missing, &[], &[3], false).is_err());
        assert!(!missing.exists());
    }
}
