//! Column layouts of the DSSAT fixed-width records.
//!
//! Offsets are zero-based character columns. Gaps between fields are the
//! single separating blanks the simulator expects; they are never part of a
//! field.

use super::FieldSpec;

/// `*TREATMENTS` data line, header
/// `@N R O C TNAME.................... CU FL SA IC MP MI MF MR MC MT ME MH SM`.
pub const TREATMENT_FIELDS: [FieldSpec; 18] = [
    FieldSpec::right("N", 0, 2),
    FieldSpec::right("R", 3, 1),
    FieldSpec::right("O", 5, 1),
    FieldSpec::right("C", 7, 1),
    FieldSpec::left("TNAME", 9, 25),
    FieldSpec::right("CU", 35, 2),
    FieldSpec::right("FL", 38, 2),
    FieldSpec::right("SA", 41, 2),
    FieldSpec::right("IC", 44, 2),
    FieldSpec::right("MP", 47, 2),
    FieldSpec::right("MI", 50, 2),
    FieldSpec::right("MF", 53, 2),
    FieldSpec::right("MR", 56, 2),
    FieldSpec::right("MC", 59, 2),
    FieldSpec::right("MT", 62, 2),
    FieldSpec::right("ME", 65, 2),
    FieldSpec::right("MH", 68, 2),
    FieldSpec::right("SM", 71, 2),
];

/// `*CULTIVARS` data line, header `@C CR INGENO CNAME`.
pub const CULTIVAR_FIELDS: [FieldSpec; 4] = [
    FieldSpec::right("C", 0, 2),
    FieldSpec::left("CR", 3, 2),
    FieldSpec::left("INGENO", 6, 6),
    FieldSpec::left("CNAME", 13, 25).to_line_end(),
];

/// First `*FIELDS` data line, header
/// `@L ID_FIELD WSTA....  FLSA  FLOB  FLDT  FLDD  FLDS  FLST SLTX  SLDP  ID_SOIL    FLNAME`.
pub const FIELD_FIELDS: [FieldSpec; 13] = [
    FieldSpec::right("L", 0, 2),
    FieldSpec::left("ID_FIELD", 3, 8),
    FieldSpec::left("WSTA", 12, 8),
    FieldSpec::right("FLSA", 20, 6),
    FieldSpec::right("FLOB", 26, 6),
    FieldSpec::right("FLDT", 32, 6),
    FieldSpec::right("FLDD", 38, 6),
    FieldSpec::right("FLDS", 44, 6),
    FieldSpec::right("FLST", 50, 6),
    FieldSpec::left("SLTX", 57, 4),
    FieldSpec::right("SLDP", 61, 6),
    FieldSpec::left("ID_SOIL", 69, 10),
    FieldSpec::left("FLNAME", 80, 20).to_line_end(),
];

/// `*FERTILIZERS (INORGANIC)` data line.
pub const FERTILIZER_FIELDS: [FieldSpec; 12] = [
    FieldSpec::right("F", 0, 2),
    FieldSpec::left("FDATE", 3, 5),
    FieldSpec::right("FMCD", 8, 6),
    FieldSpec::right("FACD", 14, 6),
    FieldSpec::right("FDEP", 20, 6),
    FieldSpec::right("FAMN", 26, 6),
    FieldSpec::right("FAMP", 32, 6),
    FieldSpec::right("FAMK", 38, 6),
    FieldSpec::right("FAMC", 44, 6),
    FieldSpec::right("FAMO", 50, 6),
    FieldSpec::right("FOCD", 56, 6),
    FieldSpec::left("FERNAME", 63, 20).to_line_end(),
];

/// `@FILEX ... TRTNO RP SQ OP CO` entry shared by simulation and GLUE batches.
pub const BATCH_ENTRY_FIELDS: [FieldSpec; 6] = [
    FieldSpec::left("FILEX", 0, 92),
    FieldSpec::right("TRTNO", 92, 7),
    FieldSpec::right("RP", 99, 7),
    FieldSpec::right("SQ", 106, 7),
    FieldSpec::right("OP", 113, 7),
    FieldSpec::right("CO", 120, 7),
];

/// Genotype (`.CUL`) record: key, display name, then opaque parameters.
pub const GENOTYPE_RECORD_FIELDS: [FieldSpec; 3] = [
    FieldSpec::left("VAR#", 0, 6),
    FieldSpec::left("VRNAME", 7, 21),
    FieldSpec::left("PARAMETERS", 28, usize::MAX).to_line_end(),
];

/// Widest cultivar name every file can hold; `VRNAME` is the narrowest of
/// `TNAME`, `CNAME` and `VRNAME`.
pub const CULTIVAR_NAME_MAX_WIDTH: usize = GENOTYPE_RECORD_FIELDS[1].width;

pub const TREATMENT_HEADER: &str =
    "@N R O C TNAME.................... CU FL SA IC MP MI MF MR MC MT ME MH SM";
pub const CULTIVAR_HEADER: &str = "@C CR INGENO CNAME";
pub const FIELD_HEADER: &str = "@L ID_FIELD WSTA....  FLSA  FLOB  FLDT  FLDD  FLDS  FLST SLTX  SLDP  ID_SOIL    FLNAME";
pub const FERTILIZER_HEADER: &str =
    "@F FDATE  FMCD  FACD  FDEP  FAMN  FAMP  FAMK  FAMC  FAMO  FOCD FERNAME";
pub const BATCH_ENTRY_HEADER: &str = "@FILEX                                                                                        TRTNO     RP     SQ     OP     CO";

#[cfg(test)]
mod tests {
    use super::{
        BATCH_ENTRY_FIELDS, BATCH_ENTRY_HEADER, CULTIVAR_FIELDS, CULTIVAR_NAME_MAX_WIDTH,
        FERTILIZER_FIELDS, FIELD_FIELDS, FIELD_HEADER, GENOTYPE_RECORD_FIELDS, TREATMENT_FIELDS, TREATMENT_HEADER,
    };
    use crate::codec::FieldSpec;

    fn assert_non_overlapping(fields: &[FieldSpec]) {
        for pair in fields.windows(2) {
            assert!(
                pair[0].end() <= pair[1].start,
                "{} overlaps {}",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn cultivar_name_limit_fits_every_name_column() {
        let width = |fields: &[FieldSpec], name: &str| {
            fields
                .iter()
                .find(|field| field.name == name)
                .map(|field| field.width)
                .expect("field exists")
        };
        assert_eq!(CULTIVAR_NAME_MAX_WIDTH, width(&GENOTYPE_RECORD_FIELDS, "VRNAME"));
        assert!(CULTIVAR_NAME_MAX_WIDTH <= width(&TREATMENT_FIELDS, "TNAME"));
        assert!(CULTIVAR_NAME_MAX_WIDTH <= width(&CULTIVAR_FIELDS, "CNAME"));
    }

    #[test]
    fn layouts_are_ordered_and_non_overlapping() {
        assert_non_overlapping(&TREATMENT_FIELDS);
        assert_non_overlapping(&CULTIVAR_FIELDS);
        assert_non_overlapping(&FIELD_FIELDS);
        assert_non_overlapping(&FERTILIZER_FIELDS);
        assert_non_overlapping(&BATCH_ENTRY_FIELDS);
        assert_non_overlapping(&GENOTYPE_RECORD_FIELDS);
    }

    #[test]
    fn treatment_columns_line_up_with_header_labels() {
        for field in TREATMENT_FIELDS.iter().filter(|field| field.name != "TNAME") {
            let label_end = field.end();
            let label_start = label_end - field.name.len();
            assert_eq!(
                &TREATMENT_HEADER[label_start..label_end],
                field.name,
                "header label for {} should end at column {}",
                field.name,
                label_end
            );
        }
    }

    #[test]
    fn field_line_numeric_columns_end_under_header_labels() {
        for name in ["FLSA", "FLOB", "FLDT", "FLDD", "FLDS", "FLST", "SLDP"] {
            let field = FIELD_FIELDS
                .iter()
                .find(|field| field.name == name)
                .expect("field exists");
            assert_eq!(&FIELD_HEADER[field.end() - name.len()..field.end()], name);
        }
        assert_eq!(FIELD_HEADER.find("ID_SOIL"), Some(69));
        assert_eq!(FIELD_HEADER.find("FLNAME"), Some(80));
    }

    #[test]
    fn batch_trtno_column_ends_under_header_label() {
        let trtno = BATCH_ENTRY_FIELDS[1];
        assert_eq!(&BATCH_ENTRY_HEADER[trtno.end() - 5..trtno.end()], "TRTNO");
        let co = BATCH_ENTRY_FIELDS[5];
        assert_eq!(BATCH_ENTRY_HEADER.len(), co.end());
    }
}
