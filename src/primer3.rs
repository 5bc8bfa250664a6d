use crate::oracle::{OracleError, OracleRecord, OracleRequest, PrimerOracle};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Write as _,
    io::{ErrorKind, Write},
    process::{Command, Output, Stdio},
};
use tracing::{debug, trace};

const DEFAULT_PRIMER3_BIN: &str = "primer3_core";
const RECORD_TERMINATOR: &str = "=";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Primer3Config {
    pub executable: String,
    /// Directory with Primer3's `primer3_config/` thermodynamic tables, when
    /// they are not installed where the executable expects them.
    pub thermodynamic_parameters_path: Option<String>,
    pub opt_gc_percent: f64,
}

impl Default for Primer3Config {
    fn default() -> Self {
        Self {
            executable: DEFAULT_PRIMER3_BIN.to_string(),
            thermodynamic_parameters_path: None,
            opt_gc_percent: 50.0,
        }
    }
}

/// Runs `primer3_core` once per request, talking Boulder-IO over stdin/stdout.
#[derive(Debug, Clone, Default)]
pub struct Primer3Oracle {
    config: Primer3Config,
}

impl Primer3Oracle {
    pub fn new(config: Primer3Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Primer3Config {
        &self.config
    }

    /// Boulder-IO record for one `pick_primer_list` task.
    pub fn boulder_input(&self, request: &OracleRequest<'_>) -> String {
        let c = &request.constraints;
        let ok = &request.pair_ok_region;
        let mut text = String::new();
        let mut tag = |key: &str, value: String| {
            let _ = writeln!(text, "{key}={value}");
        };
        tag("SEQUENCE_ID", request.sequence_id.to_string());
        tag("SEQUENCE_TEMPLATE", request.template.to_string());
        tag(
            "SEQUENCE_INCLUDED_REGION",
            format!(
                "{},{}",
                request.included_region.start, request.included_region.length
            ),
        );
        tag(
            "SEQUENCE_PRIMER_PAIR_OK_REGION_LIST",
            format!(
                "{},{},{},{}",
                ok.left_start, ok.left_length, ok.right_start, ok.right_length
            ),
        );
        tag("PRIMER_TASK", "pick_primer_list".to_string());
        tag("PRIMER_NUM_RETURN", request.num_return.to_string());
        tag("PRIMER_MIN_SIZE", c.size.min.to_string());
        tag("PRIMER_OPT_SIZE", c.size.opt.to_string());
        tag("PRIMER_MAX_SIZE", c.size.max.to_string());
        tag("PRIMER_MIN_TM", c.tm.min.to_string());
        tag("PRIMER_OPT_TM", c.tm.opt.to_string());
        tag("PRIMER_MAX_TM", c.tm.max.to_string());
        tag("PRIMER_OPT_GC_PERCENT", self.config.opt_gc_percent.to_string());
        tag("PRIMER_WT_GC_PERCENT_LT", c.gc_percent_weight.to_string());
        tag("PRIMER_WT_GC_PERCENT_GT", c.gc_percent_weight.to_string());
        tag("PRIMER_GC_CLAMP", c.gc_clamp.to_string());
        tag("PRIMER_MAX_POLY_X", c.max_poly_x.to_string());
        if let Some(path) = &self.config.thermodynamic_parameters_path {
            tag("PRIMER_THERMODYNAMIC_PARAMETERS_PATH", path.clone());
        }
        text.push_str(RECORD_TERMINATOR);
        text.push('\n');
        text
    }

    fn run(&self, input: &str) -> Result<Output, OracleError> {
        let executable = &self.config.executable;
        let mut child = Command::new(executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    OracleError::ToolNotFound {
                        executable: executable.to_string(),
                    }
                } else {
                    OracleError::Io {
                        message: format!("Could not run '{executable}': {e}"),
                    }
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| OracleError::Io {
                    message: format!("Could not send request to '{executable}': {e}"),
                })?;
        }
        child.wait_with_output().map_err(|e| OracleError::Io {
            message: format!("Could not read answer from '{executable}': {e}"),
        })
    }
}

impl PrimerOracle for Primer3Oracle {
    fn design(&mut self, request: &OracleRequest<'_>) -> Result<OracleRecord, OracleError> {
        let input = self.boulder_input(request);
        trace!(bytes = input.len(), "primer3 request");
        let output = self.run(&input)?;
        let record = parse_boulder_output(&String::from_utf8_lossy(&output.stdout));

        if let Ok(record) = &record {
            if let Some(message) = record.get("PRIMER_ERROR") {
                return Err(OracleError::Engine {
                    message: message.to_string(),
                });
            }
        }
        if !output.status.success() {
            return Err(OracleError::ToolFailed {
                executable: self.config.executable.clone(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        let record = record?;
        debug!(
            sequence_id = request.sequence_id,
            keys = record.len(),
            "primer3 finished"
        );
        Ok(record)
    }
}

/// Parses the first Boulder-IO record of `text`, keeping key order.
pub fn parse_boulder_output(text: &str) -> Result<OracleRecord, OracleError> {
    let mut record = OracleRecord::new();
    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line == RECORD_TERMINATOR {
            return Ok(record);
        }
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(OracleError::MalformedOutput {
                message: format!("line {} is not KEY=VALUE: '{line}'", line_num + 1),
            });
        };
        record.insert(key, value);
    }
    if record.is_empty() {
        return Err(OracleError::MalformedOutput {
            message: "empty answer".to_string(),
        });
    }
    // A missing terminator still leaves usable tags; the engine may have been cut short.
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintSet, ValueRange};
    use crate::oracle::{CandidateResult, IncludedRegion, PairOkRegion};

    const ANSWER: &str = "SEQUENCE_ID=ins1
PRIMER_TASK=pick_primer_list
PRIMER_LEFT_EXPLAIN=considered 4000, GC clamp failed 310, ok 2
PRIMER_RIGHT_EXPLAIN=considered 4000, ok 1
PRIMER_LEFT_NUM_RETURNED=2
PRIMER_RIGHT_NUM_RETURNED=1
PRIMER_INTERNAL_NUM_RETURNED=0
PRIMER_PAIR_NUM_RETURNED=0
PRIMER_LEFT_0_PENALTY=0.2
PRIMER_LEFT_0_SEQUENCE=AGCTTGCATGCCTGCAGGTCGAC
PRIMER_LEFT_0=310,23
PRIMER_LEFT_0_TM=57.9
PRIMER_LEFT_1_PENALTY=0.4
PRIMER_LEFT_1_SEQUENCE=GCTTGCATGCCTGCAGGTCGACT
PRIMER_LEFT_1=311,23
PRIMER_LEFT_1_TM=58.4
PRIMER_RIGHT_0_PENALTY=0.1
PRIMER_RIGHT_0_SEQUENCE=TTGTAAAACGACGGCCAGTGAAT
PRIMER_RIGHT_0=1650,23
PRIMER_RIGHT_0_TM=57.2
=
";

    fn request<'a>(template: &'a str, constraints: &ConstraintSet) -> OracleRequest<'a> {
        OracleRequest::new(
            "ins1",
            template,
            IncludedRegion::whole(template),
            PairOkRegion {
                left_start: 300,
                left_length: 600,
                right_start: 1100,
                right_length: 600,
            },
            constraints,
        )
    }

    #[test]
    fn test_boulder_input() {
        let template = "ACGT".repeat(500);
        let constraints = ConstraintSet {
            tm: ValueRange::new(60.0, 55.0, 57.5),
            ..Default::default()
        };
        let oracle = Primer3Oracle::default();
        let text = oracle.boulder_input(&request(&template, &constraints));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"SEQUENCE_ID=ins1"));
        assert_eq!(lines.last(), Some(&"="));
        assert!(lines.contains(&"SEQUENCE_INCLUDED_REGION=0,2000"));
        assert!(lines.contains(&"SEQUENCE_PRIMER_PAIR_OK_REGION_LIST=300,600,1100,600"));
        assert!(lines.contains(&"PRIMER_NUM_RETURN=30"));
        assert!(lines.contains(&"PRIMER_MIN_TM=55"));
        assert!(lines.contains(&"PRIMER_OPT_TM=57.5"));
        assert!(lines.contains(&"PRIMER_MAX_TM=60"));
        assert!(lines.contains(&"PRIMER_GC_CLAMP=2"));
        assert!(lines.contains(&"PRIMER_WT_GC_PERCENT_LT=1"));
        assert!(!text.contains("PRIMER_THERMODYNAMIC_PARAMETERS_PATH"));
    }

    #[test]
    fn test_parse_answer_keeps_order() {
        let record = parse_boulder_output(ANSWER).unwrap();
        assert_eq!(record.iter().next(), Some(("SEQUENCE_ID", "ins1")));
        let result = CandidateResult::from_record(record).unwrap();
        assert_eq!(result.left.len(), 2);
        assert_eq!(result.right[0].sequence, "TTGTAAAACGACGGCCAGTGAAT");
        let names: Vec<String> = result.sequence_rows().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["PRIMER_LEFT_0", "PRIMER_LEFT_1", "PRIMER_RIGHT_0"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_boulder_output("").is_err());
        assert!(parse_boulder_output("PRIMER_LEFT_NUM_RETURNED\n=\n").is_err());
    }

    #[test]
    fn test_missing_executable() {
        let mut oracle = Primer3Oracle::new(Primer3Config {
            executable: "/nonexistent/primer3_core".to_string(),
            ..Default::default()
        });
        assert_eq!(oracle.config().executable, "/nonexistent/primer3_core");
        let template = "ACGT".repeat(500);
        let err = oracle
            .design(&request(&template, &ConstraintSet::default()))
            .unwrap_err();
        assert!(matches!(err, OracleError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    fn fake_primer3(dir: &std::path::Path, answer: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake_primer3");
        let script = format!("#!/bin/sh\ncat > /dev/null\ncat <<'EOF'\n{answer}EOF\n");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    #[cfg(unix)]
    fn test_runs_executable() {
        let td = tempfile::tempdir().unwrap();
        let mut oracle = Primer3Oracle::new(Primer3Config {
            executable: fake_primer3(td.path(), ANSWER),
            ..Default::default()
        });
        let template = "ACGT".repeat(500);
        let record = oracle
            .design(&request(&template, &ConstraintSet::default()))
            .unwrap();
        assert_eq!(record.get("PRIMER_RIGHT_0_TM"), Some("57.2"));
    }

    #[test]
    #[cfg(unix)]
    fn test_engine_error() {
        let td = tempfile::tempdir().unwrap();
        let answer =
            "SEQUENCE_ID=ins1\nPRIMER_ERROR=SEQUENCE_INCLUDED_REGION beyond end of sequence\n=\n";
        let mut oracle = Primer3Oracle::new(Primer3Config {
            executable: fake_primer3(td.path(), answer),
            ..Default::default()
        });
        let template = "ACGT".repeat(500);
        let err = oracle
            .design(&request(&template, &ConstraintSet::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::Engine { ref message } if message.contains("beyond end")
        ));
    }
}
