use clap::Parser;

/// Scans a folder of cast vote record XML files into a CSV file with one column per
/// contest and option, and prints statistics about the records.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (folder path) The folder containing the cast vote records. The output files are
    /// written next to it.
    #[clap(value_parser)]
    pub input: String,

    /// (singlecvr or cvrreport, default singlecvr) The structure of the files: one record per
    /// file, or a report holding many records.
    #[clap(value_parser, default_value = "singlecvr")]
    pub structure: String,

    /// (number, optional) Stops after this many files. 0 means no limit.
    #[clap(value_parser)]
    pub max_files: Option<usize>,

    /// (number, optional) Stops after this many records. 0 means no limit.
    #[clap(value_parser)]
    pub max_records: Option<usize>,
}
