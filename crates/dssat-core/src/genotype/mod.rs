//! Master genotype (`.CUL`) database: parsed lines, keyed upserts and the
//! seed-then-install protocol used around each calibration.

use crate::codec::GenotypeRecord;
use crate::domain::{CodecResult, CropType, DssatError, DssatResult, TextEncoding};
use crate::serialization::{read_text, write_text_atomic};
use std::path::Path;
use tracing::{debug, warn};

/// Genotype code, separator and the first 19 characters of the name.
pub const GENOTYPE_MATCH_PREFIX_LEN: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    /// Literal match of the candidate's first `n` characters at line start.
    Prefix(usize),
    /// Exact match on the decoded genotype code.
    GenotypeCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced { removed_duplicates: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLine {
    Record { record: GenotypeRecord, text: String },
    Other(String),
}

impl DatabaseLine {
    fn from_text(text: String) -> Self {
        match GenotypeRecord::decode(&text) {
            Some(record) => Self::Record { record, text },
            None => Self::Other(text),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Record { text, .. } | Self::Other(text) => text,
        }
    }

    pub fn record(&self) -> Option<&GenotypeRecord> {
        match self {
            Self::Record { record, .. } => Some(record),
            Self::Other(_) => None,
        }
    }
}

/// A line together with its own terminator; only the final line may lack one.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredLine {
    line: DatabaseLine,
    ending: Option<LineEnding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeDatabase {
    lines: Vec<StoredLine>,
}

impl GenotypeDatabase {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .split_inclusive('\n')
            .map(|raw| {
                let (body, ending) = if let Some(body) = raw.strip_suffix("\r\n") {
                    (body, Some(LineEnding::CrLf))
                } else if let Some(body) = raw.strip_suffix('\n') {
                    (body, Some(LineEnding::Lf))
                } else {
                    (raw, None)
                };
                StoredLine {
                    line: DatabaseLine::from_text(body.to_string()),
                    ending,
                }
            })
            .collect();
        Self { lines }
    }

    pub fn load(path: &Path, encoding: TextEncoding) -> DssatResult<Self> {
        Ok(Self::parse(&read_text(path, encoding)?))
    }

    /// Persists the database atomically; on failure the file is unchanged.
    pub fn save(&self, path: &Path, encoding: TextEncoding) -> DssatResult<()> {
        write_text_atomic(path, &self.render(), encoding)
    }

    pub fn render(&self) -> String {
        let mut text = String::new();
        for stored in &self.lines {
            text.push_str(stored.line.text());
            if let Some(ending) = stored.ending {
                text.push_str(ending.as_str());
            }
        }
        text
    }

    pub fn lines(&self) -> impl Iterator<Item = &DatabaseLine> {
        self.lines.iter().map(|stored| &stored.line)
    }

    pub fn records(&self) -> impl Iterator<Item = &GenotypeRecord> {
        self.lines().filter_map(DatabaseLine::record)
    }

    pub fn find(&self, genotype_code: &str) -> Option<&GenotypeRecord> {
        self.records()
            .find(|record| record.genotype_code == genotype_code)
    }

    pub fn contains(&self, genotype_code: &str) -> bool {
        self.find(genotype_code).is_some()
    }

    /// Replaces the first line matching `candidate` under `key` and drops
    /// later matches, or appends the candidate followed by a blank line.
    pub fn upsert_line(&mut self, candidate: &str, key: MatchKey) -> DssatResult<UpsertOutcome> {
        let candidate = candidate.trim_end_matches(['\r', '\n']);
        if candidate.trim().is_empty() || candidate.contains(['\r', '\n']) {
            return Err(DssatError::reconcile(
                "GENOTYPE.CANDIDATE_LINE",
                format!("candidate genotype record '{}' is not a single line", candidate),
            ));
        }

        let matches: Vec<usize> = match key {
            MatchKey::Prefix(len) => {
                if len == 0 {
                    return Err(DssatError::reconcile(
                        "GENOTYPE.MATCH_PREFIX",
                        "genotype match prefix length must be positive",
                    ));
                }
                let prefix: String = candidate.chars().take(len).collect();
                self.positions(|line| line.text().starts_with(prefix.as_str()))
            }
            MatchKey::GenotypeCode => {
                let record = GenotypeRecord::decode(candidate).ok_or_else(|| {
                    DssatError::reconcile(
                        "GENOTYPE.CANDIDATE_RECORD",
                        format!("candidate '{}' is not a genotype record", candidate),
                    )
                })?;
                self.positions(|line| {
                    line.record()
                        .is_some_and(|known| known.genotype_code == record.genotype_code)
                })
            }
        };

        let replacement = DatabaseLine::from_text(candidate.to_string());
        let Some((&first, duplicates)) = matches.split_first() else {
            let ending = self.append_ending();
            if let Some(last) = self.lines.last_mut() {
                last.ending.get_or_insert(ending);
            }
            self.lines.push(StoredLine {
                line: replacement,
                ending: Some(ending),
            });
            self.lines.push(StoredLine {
                line: DatabaseLine::Other(String::new()),
                ending: Some(ending),
            });
            return Ok(UpsertOutcome::Inserted);
        };

        // The replaced line keeps its own terminator.
        self.lines[first].line = replacement;
        for &position in duplicates.iter().rev() {
            warn!(
                line = position + 1,
                text = self.lines[position].line.text(),
                "removing duplicate genotype record"
            );
            let removed = self.lines.remove(position);
            if removed.ending.is_none() && position == self.lines.len() {
                if let Some(last) = self.lines.last_mut() {
                    last.ending = None;
                }
            }
        }
        Ok(UpsertOutcome::Replaced {
            removed_duplicates: duplicates.len(),
        })
    }

    pub fn upsert(&mut self, record: &GenotypeRecord) -> DssatResult<UpsertOutcome> {
        let line = record.encode()?;
        self.upsert_line(&line, MatchKey::GenotypeCode)
    }

    /// Appends the crop's default record for `genotype_code` unless one is
    /// already present. Returns whether a seed was added.
    pub fn seed_missing(
        &mut self,
        crop: CropType,
        genotype_code: &str,
        cultivar_name: &str,
    ) -> DssatResult<bool> {
        if self.contains(genotype_code) {
            return Ok(false);
        }
        let seed = seed_record(crop, genotype_code, cultivar_name);
        self.upsert(&seed).map_err(|error| error.with_cultivar(genotype_code))?;
        debug!(crop = %crop, cultivar = genotype_code, "seeded default genotype record");
        Ok(true)
    }

    /// Replaces the seeded record with calibrated values. A missing seed is
    /// an error, never an implicit insert.
    pub fn install_calibrated(&mut self, record: &GenotypeRecord) -> DssatResult<()> {
        let line = record
            .encode()
            .map_err(|error| error.with_cultivar(&record.genotype_code))?;
        self.install_calibrated_line(&line).map(|_| ())
    }

    /// Installs a calibrated line exactly as the calibration wrote it, in
    /// place of the seeded record with the same genotype code.
    pub fn install_calibrated_line(&mut self, line: &str) -> DssatResult<GenotypeRecord> {
        let record = GenotypeRecord::decode(line).ok_or_else(|| {
            DssatError::reconcile(
                "GENOTYPE.CANDIDATE_RECORD",
                format!("calibrated line '{}' is not a genotype record", line),
            )
        })?;
        if !self.contains(&record.genotype_code) {
            return Err(DssatError::reconcile(
                "GENOTYPE.SEED_MISSING",
                format!(
                    "genotype {} has no record to replace; add it to the genotype file manually",
                    record.genotype_code
                ),
            )
            .with_cultivar(&record.genotype_code));
        }
        self.upsert_line(line, MatchKey::GenotypeCode)
            .map_err(|error| error.with_cultivar(&record.genotype_code))?;
        Ok(record)
    }

    fn positions(&self, predicate: impl Fn(&DatabaseLine) -> bool) -> Vec<usize> {
        self.lines()
            .enumerate()
            .filter(|(_, line)| predicate(line))
            .map(|(position, _)| position)
            .collect()
    }

    /// Terminator for appended lines: the last one the file already uses.
    fn append_ending(&self) -> LineEnding {
        self.lines
            .iter()
            .rev()
            .find_map(|stored| stored.ending)
            .unwrap_or(LineEnding::Lf)
    }
}

/// Default parameter record for a genotype not yet in the database.
pub fn seed_record(crop: CropType, genotype_code: &str, cultivar_name: &str) -> GenotypeRecord {
    GenotypeRecord {
        genotype_code: genotype_code.to_string(),
        cultivar_name: cultivar_name.to_string(),
        parameters: crop.profile().seed_parameters.to_string(),
    }
}

pub fn seed_line(crop: CropType, genotype_code: &str, cultivar_name: &str) -> CodecResult<String> {
    seed_record(crop, genotype_code, cultivar_name).encode()
}

/// Merges one candidate line into database text: literal line-start prefix
/// match, whole-line replacement, otherwise append plus a blank line.
pub fn reconcile(
    database_text: &str,
    candidate_line: &str,
    prefix_len: usize,
) -> DssatResult<String> {
    let mut database = GenotypeDatabase::parse(database_text);
    database.upsert_line(candidate_line, MatchKey::Prefix(prefix_len))?;
    Ok(database.render())
}

#[cfg(test)]
mod tests {
    use super::{
        GENOTYPE_MATCH_PREFIX_LEN, GenotypeDatabase, MatchKey, UpsertOutcome, reconcile,
        seed_line,
    };
    use crate::codec::GenotypeRecord;
    use crate::domain::{CropType, DssatErrorCategory};

    const OLD: &str = "IB0063 PIO X304C            . IB0001 120.0 0.000 685.0 907.9 10.00 38.90";
    const NEW: &str = "IB0063 PIO X304C            . IB0001 125.0 0.000 685.0 907.9 10.00 38.90";

    #[test]
    fn matching_record_is_replaced_in_place() {
        let database = format!("@VAR#  VRNAME\n{OLD}\nIB0171 PIO 3382             . IB0001\n");
        let updated = reconcile(&database, &format!("{NEW}\n"), GENOTYPE_MATCH_PREFIX_LEN)
            .expect("reconciles");
        assert_eq!(updated.lines().count(), 3);
        assert_eq!(updated.lines().nth(1), Some(NEW));
        assert_eq!(updated.matches("IB0063").count(), 1);
        assert!(updated.ends_with("IB0001\n"));
    }

    #[test]
    fn empty_database_gets_candidate_and_blank_line() {
        let updated = reconcile("", NEW, GENOTYPE_MATCH_PREFIX_LEN).expect("reconciles");
        assert_eq!(updated, format!("{NEW}\n\n"));
    }

    #[test]
    fn unterminated_database_gains_a_line_break_before_appending() {
        let updated = reconcile("@VAR#", NEW, GENOTYPE_MATCH_PREFIX_LEN).expect("reconciles");
        assert_eq!(updated, format!("@VAR#\n{NEW}\n\n"));
    }

    #[test]
    fn crlf_databases_keep_their_line_endings() {
        let database = format!("@VAR#\r\n{OLD}\r\n");
        let updated = reconcile(&database, NEW, GENOTYPE_MATCH_PREFIX_LEN).expect("reconciles");
        assert_eq!(updated, format!("@VAR#\r\n{NEW}\r\n"));
    }

    #[test]
    fn mixed_line_endings_are_kept_per_line() {
        let database = format!("*MAIZE\r\n@VAR#\n{OLD}\r\nIB0171 PIO 3382             . IB0001\n");
        let updated = reconcile(&database, NEW, GENOTYPE_MATCH_PREFIX_LEN).expect("reconciles");
        assert_eq!(
            updated,
            format!("*MAIZE\r\n@VAR#\n{NEW}\r\nIB0171 PIO 3382             . IB0001\n")
        );
    }

    #[test]
    fn duplicate_matches_collapse_to_one_record() {
        let database = format!("{OLD}\n{OLD}\n");
        let mut parsed = GenotypeDatabase::parse(&database);
        let outcome = parsed
            .upsert_line(NEW, MatchKey::Prefix(GENOTYPE_MATCH_PREFIX_LEN))
            .expect("upserts");
        assert_eq!(outcome, UpsertOutcome::Replaced { removed_duplicates: 1 });
        assert_eq!(parsed.render(), format!("{NEW}\n"));
    }

    #[test]
    fn metacharacters_in_names_match_literally() {
        let old = "IB0999 A+B (X*Y)            . IB0001 1.0";
        let new = "IB0999 A+B (X*Y)            . IB0001 2.0";
        let updated = reconcile(&format!("{old}\n"), new, GENOTYPE_MATCH_PREFIX_LEN)
            .expect("reconciles");
        assert_eq!(updated, format!("{new}\n"));
    }

    #[test]
    fn install_requires_a_seed() {
        let mut database = GenotypeDatabase::parse("@VAR#  VRNAME\n");
        let calibrated = GenotypeRecord {
            genotype_code: "IB0063".to_string(),
            cultivar_name: "PIO X304C".to_string(),
            parameters: ". IB0001 125.0".to_string(),
        };
        let error = database
            .install_calibrated(&calibrated)
            .expect_err("no seed yet");
        assert_eq!(error.category(), DssatErrorCategory::ReconcileError);
        assert_eq!(error.context().cultivar.as_deref(), Some("IB0063"));

        assert!(database.seed_missing(CropType::Maize, "IB0063", "PIO X304C").expect("seeds"));
        assert!(!database.seed_missing(CropType::Maize, "IB0063", "PIO X304C").expect("no-op"));
        database.install_calibrated(&calibrated).expect("installs");
        assert_eq!(database.records().count(), 1);
        assert_eq!(
            database.find("IB0063").map(|record| record.parameters.as_str()),
            Some(". IB0001 125.0")
        );
    }

    #[test]
    fn calibrated_lines_are_installed_byte_for_byte() {
        let mut database = GenotypeDatabase::parse(&format!("@VAR#  VRNAME\n{OLD}\n"));
        let calibrated = "IB0063 PIO X304C               IB0001 125.0 0.000 685.0";
        let record = database
            .install_calibrated_line(calibrated)
            .expect("seeded record is replaced");
        assert_eq!(record.genotype_code, "IB0063");
        assert_eq!(database.render(), format!("@VAR#  VRNAME\n{calibrated}\n"));
    }

    #[test]
    fn calibrated_line_without_a_seed_is_rejected() {
        let mut database = GenotypeDatabase::parse(&format!("{OLD}\n"));
        let error = database
            .install_calibrated_line("IB0999 OTHER                 . IB0001 1.0")
            .expect_err("no seed for IB0999");
        assert_eq!(error.placeholder(), "GENOTYPE.SEED_MISSING");
        assert_eq!(database.render(), format!("{OLD}\n"));
    }

    #[test]
    fn seed_lines_use_crop_defaults() {
        let maize = seed_line(CropType::Maize, "IB0063", "PIO X304C").expect("encodes");
        assert_eq!(maize, OLD);
        let rice = seed_line(CropType::Rice, "UA0001", "沈稻1号").expect("encodes");
        assert!(rice.ends_with("83.0   1.0"));
        assert_eq!(rice.chars().nth(28), Some('.'));
    }

    #[test]
    fn cultivar_names_beyond_the_record_width_are_codec_errors() {
        let error = seed_line(CropType::Maize, "IB0063", &"N".repeat(22))
            .expect_err("name overflows");
        assert_eq!(error.category(), DssatErrorCategory::CodecError);
    }
}
