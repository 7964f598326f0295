#![forbid(unsafe_code)]

fn main() {
    std::process::exit(dice_bench_cli::run());
}
