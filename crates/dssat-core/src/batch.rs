//! Batch manifests consumed by the calibration script and the simulator.

use crate::codec::BatchEntryLine;
use crate::codec::layout::BATCH_ENTRY_HEADER;
use crate::domain::{CodecResult, CropType, DssatError, DssatResult, TreatmentGroup};
use regex::{NoExpand, Regex};

pub const SIMULATION_BATCH_FILE: &str = "DSSBatch.v47";

const CALIBRATION_REPLICATION: u32 = 0;
const SIMULATION_REPLICATION: u32 = 1;
const GLUE_BATCH_POINTER: &str = r#"CultivarBatchFile<-[^;]+";?"#;

/// One experiment file and the treatments to simulate from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationBatchEntry {
    pub experiment_path: String,
    pub treatment_numbers: Vec<u32>,
}

/// `PIO X304C` + maize -> `PIO_X304C.MZC`.
pub fn calibration_batch_file_name(crop: CropType, cultivar_name: &str) -> String {
    format!(
        "{}{}",
        cultivar_name.replace(' ', "_"),
        crop.calibration_batch_suffix()
    )
}

/// Name of the record file the calibration script leaves in its work
/// directory, `<CR><code> <name>.CUL`.
pub fn calibration_result_file_name(
    crop: CropType,
    genotype_code: &str,
    cultivar_name: &str,
) -> String {
    format!(
        "{}{} {}.CUL",
        crop.profile().abbreviation,
        genotype_code,
        cultivar_name
    )
}

pub fn render_calibration_batch(
    crop: CropType,
    group: &TreatmentGroup,
    experiment_path: &str,
) -> CodecResult<String> {
    let mut lines = vec![
        format!(
            "$BATCH(CULTIVAR):{}{} {}",
            crop.profile().abbreviation,
            group.genotype_code,
            group.cultivar_name
        ),
        " ".to_string(),
        BATCH_ENTRY_HEADER.to_string(),
    ];
    for &treatment in &group.treatment_numbers {
        lines.push(
            BatchEntryLine::new(experiment_path, treatment, CALIBRATION_REPLICATION).encode()?,
        );
    }
    Ok(lines.join("\n") + "\n")
}

pub fn render_simulation_batch(
    crop: CropType,
    entries: &[SimulationBatchEntry],
) -> CodecResult<String> {
    let profile = crop.profile();
    let mut lines = vec![
        format!("$BATCH({})", profile.name.to_ascii_uppercase()),
        "!".to_string(),
        format!("! Crop         : {}", profile.display_name),
        format!("! ExpNo        : {}", entries.len()),
        String::new(),
        BATCH_ENTRY_HEADER.to_string(),
    ];
    for entry in entries {
        for &treatment in &entry.treatment_numbers {
            let line = BatchEntryLine::new(
                entry.experiment_path.as_str(),
                treatment,
                SIMULATION_REPLICATION,
            );
            lines.push(line.encode()?);
        }
    }
    Ok(lines.join("\n") + "\n")
}

/// Rewrites the `CultivarBatchFile<-"...";` assignment in the GLUE driver
/// script to point at `batch_file_name`.
pub fn point_glue_script(script: &str, batch_file_name: &str) -> DssatResult<String> {
    let pointer = Regex::new(GLUE_BATCH_POINTER).map_err(|error| {
        DssatError::internal(
            "SYS.GLUE_POINTER_PATTERN",
            format!("invalid batch pointer pattern: {}", error),
        )
    })?;
    if !pointer.is_match(script) {
        return Err(DssatError::collaborator(
            "RUN.GLUE_SCRIPT_POINTER",
            "calibration script has no CultivarBatchFile assignment to rewrite",
        ));
    }
    let replacement = format!("CultivarBatchFile<-\"{}\";", batch_file_name);
    Ok(pointer
        .replace_all(script, NoExpand(&replacement))
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::{
        SimulationBatchEntry, calibration_batch_file_name, calibration_result_file_name,
        point_glue_script, render_calibration_batch, render_simulation_batch,
    };
    use crate::domain::{CropType, TreatmentGroup};

    const EXPERIMENT: &str = "C:\\DSSAT47\\Maize\\IBWA8301.MZX";

    #[test]
    fn calibration_batch_lists_the_group_treatments() {
        let group = TreatmentGroup {
            genotype_code: "IB0063".to_string(),
            cultivar_name: "PIO X304C".to_string(),
            cultivar_index: 1,
            treatment_numbers: vec![1, 3],
        };
        let text = render_calibration_batch(CropType::Maize, &group, EXPERIMENT).expect("renders");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "$BATCH(CULTIVAR):MZIB0063 PIO X304C");
        assert_eq!(lines[1], " ");
        assert!(lines[2].starts_with("@FILEX"));
        assert_eq!(lines.len(), 5);
        assert!(lines[4].starts_with(EXPERIMENT));
        assert!(lines[4].ends_with("      3      0      0      0      0"));
        assert_eq!(calibration_batch_file_name(CropType::Maize, "PIO X304C"), "PIO_X304C.MZC");
        assert_eq!(
            calibration_result_file_name(CropType::Maize, "IB0063", "PIO X304C"),
            "MZIB0063 PIO X304C.CUL"
        );
    }

    #[test]
    fn simulation_batch_covers_every_experiment() {
        let entries = [
            SimulationBatchEntry {
                experiment_path: EXPERIMENT.to_string(),
                treatment_numbers: vec![1, 2],
            },
            SimulationBatchEntry {
                experiment_path: "C:\\DSSAT47\\Maize\\IBWA8302.MZX".to_string(),
                treatment_numbers: vec![1],
            },
        ];
        let text = render_simulation_batch(CropType::Maize, &entries).expect("renders");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "$BATCH(MAIZE)");
        assert_eq!(lines[2], "! Crop         : Maize");
        assert_eq!(lines[3], "! ExpNo        : 2");
        assert_eq!(lines.len(), 9);
        assert!(lines[8].contains("IBWA8302.MZX"));
        assert!(lines[7].ends_with("      2      1      0      0      0"));
    }

    #[test]
    fn glue_pointer_is_rewritten_literally() {
        let script = "x <- 1\nCultivarBatchFile<-\"OLD.MZC\";\nrun()\n";
        let rewritten = point_glue_script(script, "A$1_(B).MZC").expect("rewrites");
        assert_eq!(rewritten, "x <- 1\nCultivarBatchFile<-\"A$1_(B).MZC\";\nrun()\n");
        assert!(point_glue_script("run()\n", "A.MZC").is_err());
    }
}
