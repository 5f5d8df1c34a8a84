use crate::log_println;

const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: env_or!("GIT_COMMIT_SHORT", "unknown"),
            build_time: env_or!("BUILD_TIME", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

pub fn print_banner(info: &BannerInfo) {
    log_println!();
    log_println!("{CYAN}{BOLD}  ytstream{RESET} {DIM}opus over webm, one chunk at a time{RESET}");
    log_println!("{DIM}  ------------------------------------{RESET}");
    log_println!("  {BOLD}{:<12}{RESET}{}", "Version", info.version);
    log_println!("  {BOLD}{:<12}{RESET}{}", "Commit", info.commit);
    log_println!("  {BOLD}{:<12}{RESET}{}", "Built", info.build_time);
    log_println!("  {BOLD}{:<12}{RESET}{}", "Profile", info.profile);
    log_println!();
}
