use std::process::ExitCode;

fn main() -> ExitCode {
    ysh::lib_main()
}
