use clap::Parser;

/// Reconciles pre-survey, post-survey and attendance exports into a master record table.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON run configuration: table sources, canonical schema with
    /// aliases and vocabularies, and matching options. Table paths are resolved
    /// relative to this file.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path or empty) If specified, the run summary (write set and anomaly
    /// report) is written in JSON format to the given location instead of the
    /// standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, surveymerge
    /// checks that the computed summary matches the reference and fails on any
    /// difference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
