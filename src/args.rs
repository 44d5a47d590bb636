use clap::Parser;

/// This is a reappointment trend analysis program for appointment registers.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) JSON configuration describing the source files, the column mapping
    /// and the analysis rules. For more information about the file format, read the documentation.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference trend summary in JSON format. If provided, apptrend will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory path or empty) Where the output tables and the trend summary are written.
    /// Setting this option overrides the directory that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out_dir: Option<String>,

    /// (file path or empty) A single input file to analyze without a configuration file.
    /// Setting this option overrides what may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default csv) The type of the input: csv or excel.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (integer, optional) Minimum appointments an organization needs in a year to be eligible
    /// as that year's reappointment-rate leader. Overrides the configuration file.
    #[clap(long, value_parser)]
    pub min_count: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
