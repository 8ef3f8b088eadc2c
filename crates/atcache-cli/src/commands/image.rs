use atcache_build::dockerfile::DockerfileGenerator;
use atcache_build::eject::{EJECTED_DOCKERFILE, check_stages, is_ejected, load_ejected_dockerfile};
use atcache_build::{ImageBuilder, check_inputs};
use atcache_core::CONFIG_FILE;

use super::{load_config, project_dir};

pub fn dockerfile() -> anyhow::Result<()> {
    let config = load_config()?;
    config.image.validate()?;

    print!("{}", DockerfileGenerator::new(&config.image).render());
    Ok(())
}

pub fn eject() -> anyhow::Result<()> {
    let project_dir = project_dir();
    let config = load_config()?;
    config.image.validate()?;

    let dockerfile = DockerfileGenerator::new(&config.image).render();
    atcache_build::eject::eject(&project_dir, &dockerfile)?;

    println!("Ejected build config to {EJECTED_DOCKERFILE}");
    println!("You can now edit it directly. atcache build will use this file.");
    println!("Keep the `dependencies` and `package` stage names; the build targets them.");
    Ok(())
}

/// Check everything `build` needs before docker runs.
pub fn check() -> anyhow::Result<()> {
    let project_dir = project_dir();
    let config = load_config()?;
    let mut passed = true;

    let config_source = if project_dir.join(CONFIG_FILE).exists() {
        CONFIG_FILE
    } else {
        "defaults"
    };
    report_line("Config", Ok(config_source.to_owned()), &mut passed);

    let image = config
        .image
        .validate()
        .map(|()| format!("{} -> {}", config.image.base_image, config.image.tag))
        .map_err(anyhow::Error::from);
    report_line("Image", image, &mut passed);

    let inputs = check_inputs(&project_dir, &config.image)
        .map(|n| {
            format!(
                "{n} requirement(s) in {}, {} found",
                config.image.manifest, config.image.package_script
            )
        })
        .map_err(anyhow::Error::from);
    report_line("Inputs", inputs, &mut passed);

    let dockerfile = if is_ejected(&project_dir) {
        load_ejected_dockerfile(&project_dir)
            .and_then(|content| check_stages(&content))
            .map(|()| "ejected".to_owned())
            .map_err(anyhow::Error::from)
    } else {
        Ok("generated".to_owned())
    };
    report_line("Dockerfile", dockerfile, &mut passed);

    let base = config
        .airtable
        .base
        .clone()
        .unwrap_or_else(|| "not set (pass --base per call)".to_owned());
    report_line("Airtable base", Ok(base), &mut passed);

    if !passed {
        anyhow::bail!("some checks failed; see above for details");
    }
    Ok(())
}

fn report_line(name: &str, result: anyhow::Result<String>, passed: &mut bool) {
    match result {
        Ok(detail) => println!("  OK  {name:<14} {detail}"),
        Err(e) => {
            *passed = false;
            println!("  NG  {name:<14} {e:#}");
        }
    }
}

/// Run the full image build.
pub async fn build(tag: Option<String>) -> anyhow::Result<()> {
    let project_dir = project_dir();
    let mut config = load_config()?;
    if let Some(tag) = tag {
        config.image.tag = tag;
    }

    println!(
        "Building {} from {}...",
        config.image.tag, config.image.base_image
    );
    let builder = ImageBuilder::new();
    let report = match builder.build(&project_dir, &config.image).await {
        Ok(report) => report,
        Err(e) => {
            let stage = e.stage();
            return Err(anyhow::Error::new(e).context(format!("build failed at the {stage} stage")));
        }
    };

    println!();
    println!("Built: {}", report.image_tag);
    println!("  image:        {}", report.image_id);
    println!("  requirements: {}", report.requirements);
    println!(
        "  dockerfile:   {}",
        if report.ejected { "ejected" } else { "generated" }
    );
    println!("  context:      {}", report.context_dir.display());
    Ok(())
}
