use anyhow::{Context, Result, bail};

use waterbar_core::models::{Profile, ProfileUpdate};
use waterbar_core::service::WaterBarService;

use crate::config::Config;

pub(crate) fn cmd_profile_set(
    service: &WaterBarService,
    profile_id: &str,
    update: &ProfileUpdate,
    json: bool,
) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one field, e.g. --weight 70");
    }

    // A body-type label stands in for a measured body fat percentage, so
    // resolve it against the lookup table unless --body-fat was also given.
    let mut update = update.clone();
    if let (Some(label), None) = (&update.body_composition_label, update.body_fat_pct) {
        let options = service.body_comp_options()?;
        let option = options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(label))
            .with_context(|| {
                let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
                format!(
                    "Unknown body type '{label}'. Choose one of: {}",
                    labels.join(", ")
                )
            })?;
        update.body_fat_pct = Some(option.body_fat_pct);
        update.body_composition_label = Some(option.label.clone());
    }

    let profile = service.update_profile(profile_id, &update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("Profile '{}' updated.", profile.id);
        print_profile(&profile);
    }

    Ok(())
}

pub(crate) fn cmd_profile_show(
    service: &WaterBarService,
    profile_id: &str,
    json: bool,
) -> Result<()> {
    let profile = service.profile(profile_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print_profile(&profile);
    }

    Ok(())
}

pub(crate) fn cmd_profile_use(
    service: &WaterBarService,
    config: &Config,
    id: &str,
    json: bool,
) -> Result<()> {
    // Creates the profile row if it does not exist yet.
    service.profile(id)?;
    config.set_default_profile_id(id)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "default_profile": id }))?
        );
    } else {
        println!("Default profile set to '{id}'.");
    }

    Ok(())
}

fn print_profile(profile: &Profile) {
    println!("Profile: {}", profile.id);
    println!(
        "  Name:       {}",
        profile.name.as_deref().unwrap_or("-")
    );
    println!(
        "  Height:     {}",
        profile
            .height_cm
            .map_or("-".to_string(), |v| format!("{v:.1} cm"))
    );
    println!(
        "  Weight:     {}",
        profile
            .weight_kg
            .map_or("-".to_string(), |v| format!("{v:.1} kg"))
    );
    println!(
        "  Age:        {}",
        profile.age.map_or("-".to_string(), |v| v.to_string())
    );
    println!("  Sex:        {}", profile.sex.as_deref().unwrap_or("-"));
    println!(
        "  Body fat:   {}",
        profile
            .body_fat_pct
            .map_or("-".to_string(), |v| format!("{v:.1}%"))
    );
    println!(
        "  Body type:  {}",
        profile.body_composition_label.as_deref().unwrap_or("-")
    );
    println!(
        "  Multiplier: {}",
        profile
            .lean_mass_multiplier
            .map_or("-".to_string(), |v| format!("{v:.2}"))
    );

    if !profile.is_complete() {
        println!();
        println!("Incomplete: set name, height and weight to start a session.");
    } else if !profile.has_body_comp() {
        println!();
        println!("No body composition yet: add --body-fat or --body-type to refine projections.");
    }
}
