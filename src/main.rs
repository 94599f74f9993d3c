fn main() {
    if let Err(error) = team_memo_lib::run() {
        eprintln!("team-memo: {:#}", error);
        std::process::exit(1);
    }
}
