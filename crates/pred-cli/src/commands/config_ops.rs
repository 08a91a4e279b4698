use std::fs;

use pred_core::settings;

use super::die;

pub fn settings_export() {
    print!("{}", settings::default_toml());
}

pub fn settings_validate(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    let s = die!(settings::parse_settings_toml(&content), "Error: {}");
    println!("OK: {}", describe(&s));
}

/// Load a custom settings file before any command reads the settings.
pub fn settings_load(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    die!(settings::init_custom(content), "Error in {file}: {}");
}

fn describe(s: &settings::Settings) -> String {
    let c = &s.substitution;
    format!(
        "substitution.min_variants={}, substitution.relax_count={}, substitution.pool_factor={}, substitution.lp_alpha={}, substitution.strategy={}",
        c.min_variants, c.relax_count, c.pool_factor, c.lp_alpha, c.strategy
    )
}
