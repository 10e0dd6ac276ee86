use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

mod clone;
mod commands;
mod config;
mod deductions;
mod error;
mod logging;
mod mark;
mod marking_config;
mod process;
mod repo;
mod report;
mod resolve;
mod roster;
mod structure;
mod summary;
mod test_runner;

#[derive(Parser, Debug)]
#[command(version, about = "Marks student shell-scripting submissions", long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, Subcommand)]
enum SubCommand {
    /// Mark every student against every module and write overall_results.json
    Mark {
        /// Student roster
        #[arg(default_value = "data/test_students.json")]
        students: Utf8PathBuf,
        /// Module configuration
        #[arg(default_value = "data/test_config.json")]
        config: Utf8PathBuf,
        /// Folder holding the student submissions
        #[arg(default_value = "data")]
        fileloc: Utf8PathBuf,
        /// Folder for results and logs
        #[arg(default_value = "results")]
        output: Utf8PathBuf,
        #[arg(short, long)]
        debug: bool,
        /// Skip the per-module structure check (currently ignored)
        #[arg(short, long)]
        noweekcheck: bool,
    },
    /// Clone every student's repository into the data folder
    Clone {
        #[arg(default_value = "data/students.json")]
        students: Utf8PathBuf,
        #[arg(default_value = "data")]
        datafolder: Utf8PathBuf,
        /// Defaults to the number of CPUs
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Build a roster from the sub-directories of a folder
    RosterFromDir {
        #[arg(default_value = "data")]
        dir: Utf8PathBuf,
        #[arg(default_value = "data/students.json")]
        outfile: Utf8PathBuf,
    },
    /// Build a roster from a CSV export
    RosterFromCsv {
        #[arg(default_value = "data/students.csv")]
        csv: Utf8PathBuf,
        #[arg(default_value = "data/students.json")]
        outfile: Utf8PathBuf,
    },
    /// Count deduction reasons and per-student totals in a results file
    Summary {
        #[arg(default_value = "results/overall_results.json")]
        results: Utf8PathBuf,
        #[arg(short, long)]
        out: Option<Utf8PathBuf>,
    },
}

fn main() {
    let cli = Args::parse();

    let ok = match cli.command {
        SubCommand::Mark {
            students,
            config,
            fileloc,
            output,
            debug,
            noweekcheck,
        } => commands::mark(&mark::MarkArgs {
            students: students.into_std_path_buf(),
            modules: config.into_std_path_buf(),
            fileloc: fileloc.into_std_path_buf(),
            output: output.into_std_path_buf(),
            debug,
            noweekcheck,
        }),
        SubCommand::Clone {
            students,
            datafolder,
            threads,
        } => commands::clone(students.as_std_path(), datafolder.as_std_path(), threads),
        SubCommand::RosterFromDir { dir, outfile } => {
            commands::roster_from_dir(dir.as_std_path(), outfile.as_std_path())
        }
        SubCommand::RosterFromCsv { csv, outfile } => {
            commands::roster_from_csv(csv.as_std_path(), outfile.as_std_path())
        }
        SubCommand::Summary { results, out } => {
            commands::summary(results.as_std_path(), out.as_deref().map(|p| p.as_std_path()))
        }
    };

    if !ok {
        std::process::exit(1);
    }
}
