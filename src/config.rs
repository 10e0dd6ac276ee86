use std::path::{Path, PathBuf};

pub const RESULTS_FILE_NAME: &str = "overall_results.json";

pub fn logs_dir(output: &Path) -> PathBuf {
    output.join("logs")
}

pub fn run_log_file(output: &Path) -> PathBuf {
    logs_dir(output).join("mark.log")
}

pub fn student_log_file(logs: &Path, student_id: &str) -> PathBuf {
    logs.join(format!("{}.log", student_id))
}

pub fn overall_results_file(output: &Path) -> PathBuf {
    output.join(RESULTS_FILE_NAME)
}

pub fn module_config_file(test_location: &Path, module_name: &str) -> PathBuf {
    test_location.join(format!("{}_config.json", module_name))
}

pub fn submission_dir(fileloc: &Path, student_folder: &str) -> PathBuf {
    fileloc.join(student_folder)
}

pub fn module_dir(fileloc: &Path, student_folder: &str, module_folder: &str) -> PathBuf {
    submission_dir(fileloc, student_folder).join(module_folder)
}
