use crate::extract::ActivityRecord;
use crate::output::{OutputError, OutputResult, RecordSink};
use csv::{ReaderBuilder, Writer};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CSV-backed [`RecordSink`]
///
/// Keeps every appended record in memory so the master can be rewritten with
/// an updated column union; on startup an existing master is read back in, so
/// a restarted worker extends its previous run instead of clobbering it.
pub struct CsvSink {
    out_dir: PathBuf,
    master: PathBuf,
    columns: Vec<String>,
    rows: Vec<ActivityRecord>,
}

impl CsvSink {
    /// `suffix` distinguishes shard artifacts (e.g. `_shard2of3`)
    pub fn new(out_dir: impl Into<PathBuf>, suffix: &str) -> OutputResult<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(out_dir.join("activities"))?;
        let master = out_dir.join(format!("external_activities_master{suffix}.csv"));

        let mut sink = Self {
            out_dir,
            master,
            columns: Vec::new(),
            rows: Vec::new(),
        };
        if sink.master.exists() {
            sink.load_existing()?;
            info!(
                "Resuming master {} with {} row(s), {} column(s)",
                sink.master.display(),
                sink.rows.len(),
                sink.columns.len()
            );
        }
        Ok(sink)
    }

    fn load_existing(&mut self) -> OutputResult<()> {
        let mut reader = ReaderBuilder::new().from_path(&self.master)?;
        self.columns = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect();
        for row in reader.records() {
            let row = row?;
            if row.len() != self.columns.len() {
                return Err(OutputError::Format(format!(
                    "row width {} does not match header width {} in {}",
                    row.len(),
                    self.columns.len(),
                    self.master.display()
                )));
            }
            let mut record = ActivityRecord::new();
            for (key, value) in self.columns.iter().zip(row.iter()) {
                if !value.is_empty() {
                    record.insert(key.clone(), value);
                }
            }
            self.rows.push(record);
        }
        Ok(())
    }

    fn merge_columns(&mut self, record: &ActivityRecord) {
        for key in record.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.to_string());
            }
        }
    }

    fn write_detail(&self, record: &ActivityRecord) -> OutputResult<PathBuf> {
        let id = sanitize_component(record.id());
        let name = if id.is_empty() {
            format!("detail_row{}.csv", self.rows.len())
        } else {
            format!("detail_{id}.csv")
        };
        let path = self.out_dir.join("activities").join(name);

        let mut writer = Writer::from_path(&path)?;
        writer.write_record(record.keys())?;
        writer.write_record(record.iter().map(|(_, v)| v))?;
        writer.flush()?;
        Ok(path)
    }

    fn rewrite_master(&self) -> OutputResult<()> {
        let mut writer = Writer::from_path(&self.master)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(self.columns.iter().map(|c| row.get(c).unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: &ActivityRecord) -> OutputResult<PathBuf> {
        let detail = self.write_detail(record)?;
        self.merge_columns(record);
        self.rows.push(record.clone());
        self.rewrite_master()?;
        debug!(
            "Wrote {} ({} master rows)",
            detail.display(),
            self.rows.len()
        );
        Ok(detail)
    }

    fn known_columns(&self) -> &[String] {
        &self.columns
    }

    fn master_path(&self) -> &Path {
        &self.master
    }
}

/// Restricts a filename component to a safe character set
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> ActivityRecord {
        let mut r = ActivityRecord::new();
        for (k, v) in pairs {
            r.insert(*k, *v);
        }
        r
    }

    #[test]
    fn master_columns_grow_as_a_union_without_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "").unwrap();

        sink.append(&record(&[("Activity ID", "1"), ("Title", "A")]))
            .unwrap();
        sink.append(&record(&[("Activity ID", "2"), ("Hours", "4")]))
            .unwrap();

        assert_eq!(sink.known_columns(), &["Activity ID", "Title", "Hours"]);

        let content = std::fs::read_to_string(sink.master_path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("Activity ID,Title,Hours"));
        // earlier row padded with the later column, later row with the earlier
        assert_eq!(lines.next(), Some("1,A,"));
        assert_eq!(lines.next(), Some("2,,4"));
    }

    #[test]
    fn per_record_artifact_carries_only_its_own_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "").unwrap();

        let path = sink
            .append(&record(&[("Activity ID", "42"), ("Title", "B")]))
            .unwrap();
        assert!(path.ends_with("activities/detail_42.csv"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "Activity ID,Title\n42,B\n");
    }

    #[test]
    fn shard_suffix_lands_in_the_master_filename() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path(), "_shard2of3").unwrap();
        assert!(sink
            .master_path()
            .ends_with("external_activities_master_shard2of3.csv"));
    }

    #[test]
    fn a_restarted_sink_extends_the_existing_master() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvSink::new(dir.path(), "").unwrap();
            sink.append(&record(&[("Activity ID", "1"), ("Title", "A")]))
                .unwrap();
        }
        let mut sink = CsvSink::new(dir.path(), "").unwrap();
        sink.append(&record(&[("Activity ID", "2")])).unwrap();

        let content = std::fs::read_to_string(sink.master_path()).unwrap();
        assert_eq!(content, "Activity ID,Title\n1,A\n2,\n");
    }

    #[test]
    fn unsafe_id_characters_are_sanitized_in_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "").unwrap();
        let path = sink
            .append(&record(&[("Activity ID", "a/b:c")]))
            .unwrap();
        assert!(path.ends_with("activities/detail_a_b_c.csv"));
    }
}
