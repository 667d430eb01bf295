use tagreg::cli;

fn main() {
    let result = cli::run();
    proc_exit::exit(result);
}
