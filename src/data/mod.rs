/// Data layer: record types, reading, joining, merging and writing.
///
/// Architecture:
/// ```text
///  predictor output (.tsv / .csv / .parquet)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse rows → PeptideRecord (malformed rows counted)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  optional peptide length window
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  idmap    │  peptide → gene id
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  merge    │  one record per (peptide, allele, sample)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  classes  │  Class I / Class II split + column shapes
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer   │  sorted, fixed-column tables
///   └──────────┘
/// ```

pub mod classes;
pub mod filter;
pub mod idmap;
pub mod loader;
pub mod merge;
pub mod model;
pub mod schema;
pub mod writer;
