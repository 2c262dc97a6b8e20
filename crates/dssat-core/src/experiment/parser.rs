use crate::codec::layout::{CULTIVAR_HEADER, TREATMENT_HEADER};
use crate::codec::{CultivarLine, TreatmentLine};
use crate::domain::{
    DssatError, ErrorContextExt, ParserResult, TextEncoding, Treatment, TreatmentGroup,
};
use crate::serialization::read_text;
use serde::Serialize;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

const TREATMENT_MARKER: &str = "@N R O C TNAME";
const CULTIVAR_MARKER: &str = "@C CR INGENO CNAME";

/// Cultivar and treatment associations recovered from an experiment file,
/// in cultivars-section order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedExperiment {
    pub genotype_codes: Vec<String>,
    pub cultivar_names: Vec<String>,
    pub groups: Vec<TreatmentGroup>,
    /// `fertilizer_index` holds the file's `MF` level as written.
    pub treatments: Vec<Treatment>,
}

impl ParsedExperiment {
    pub fn treatment_numbers(&self) -> Vec<u32> {
        self.treatments.iter().map(|treatment| treatment.number).collect()
    }

    pub fn treatment_count(&self) -> usize {
        self.treatments.len()
    }

    pub fn group(&self, genotype_code: &str) -> Option<&TreatmentGroup> {
        self.groups
            .iter()
            .find(|group| group.genotype_code == genotype_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Treatments,
    Cultivars,
}

pub fn parse_file(path: &Path, encoding: TextEncoding) -> ParserResult<ParsedExperiment> {
    let text = read_text(path, encoding)?;
    parse(text.as_bytes()).at_path(path)
}

pub fn parse<R: BufRead>(reader: R) -> ParserResult<ParsedExperiment> {
    let mut section = Section::Outside;
    let mut saw_treatments = false;
    let mut saw_cultivars = false;
    let mut treatments: Vec<Treatment> = Vec::new();
    let mut cultivars: Vec<CultivarLine> = Vec::new();

    for (position, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| {
            DssatError::io_system(
                "IO.EXPERIMENT_READ",
                format!("failed to read experiment line {}: {}", position + 1, source),
            )
        })?;

        if line.starts_with(TREATMENT_MARKER) {
            section = Section::Treatments;
            saw_treatments = true;
            continue;
        }
        if line.starts_with(CULTIVAR_MARKER) {
            section = Section::Cultivars;
            saw_cultivars = true;
            continue;
        }
        if section == Section::Outside || line.starts_with('!') {
            continue;
        }
        if line.trim().is_empty() || line.starts_with(['*', '@']) {
            section = Section::Outside;
            continue;
        }

        match section {
            Section::Treatments => {
                let decoded = TreatmentLine::decode(&line)?;
                if treatments.iter().any(|known| known.number == decoded.number) {
                    return Err(DssatError::parse(
                        "PARSE.DUPLICATE_TREATMENT",
                        format!("treatment {} appears more than once", decoded.number),
                    ));
                }
                treatments.push(Treatment {
                    number: decoded.number,
                    cultivar_index: decoded.cultivar_index,
                    fertilizer_index: decoded.fertilizer_index,
                    name: decoded.name,
                });
            }
            Section::Cultivars => {
                let decoded = CultivarLine::decode(&line)?;
                if let Some(known) = cultivars.iter().find(|known| {
                    known.index == decoded.index || known.genotype_code == decoded.genotype_code
                }) {
                    return Err(DssatError::parse(
                        "PARSE.DUPLICATE_CULTIVAR",
                        format!(
                            "cultivar {} ({}) collides with cultivar {} ({})",
                            decoded.index, decoded.genotype_code, known.index, known.genotype_code
                        ),
                    )
                    .with_cultivar(&decoded.genotype_code));
                }
                cultivars.push(decoded);
            }
            Section::Outside => {}
        }
    }

    if !saw_treatments || !saw_cultivars {
        let missing = if saw_treatments {
            CULTIVAR_HEADER
        } else {
            TREATMENT_HEADER
        };
        return Err(DssatError::parse(
            "PARSE.MISSING_MARKER",
            format!("experiment file has no '{}' section", missing),
        ));
    }

    let known: HashSet<u32> = cultivars.iter().map(|cultivar| cultivar.index).collect();
    if let Some(orphan) = treatments
        .iter()
        .find(|treatment| !known.contains(&treatment.cultivar_index))
    {
        return Err(DssatError::parse(
            "PARSE.UNKNOWN_CULTIVAR",
            format!(
                "treatment {} references cultivar {} which the cultivars section does not define",
                orphan.number, orphan.cultivar_index
            ),
        ));
    }

    let groups = cultivars
        .iter()
        .map(|cultivar| TreatmentGroup {
            genotype_code: cultivar.genotype_code.clone(),
            cultivar_name: cultivar.name.clone(),
            cultivar_index: cultivar.index,
            treatment_numbers: treatments
                .iter()
                .filter(|treatment| treatment.cultivar_index == cultivar.index)
                .map(|treatment| treatment.number)
                .collect(),
        })
        .collect();

    Ok(ParsedExperiment {
        genotype_codes: cultivars.iter().map(|c| c.genotype_code.clone()).collect(),
        cultivar_names: cultivars.iter().map(|c| c.name.clone()).collect(),
        groups,
        treatments,
    })
}
