//! Package commands: create, publish, versions, show, fetch, reconcile.

use std::path::Path;

use anyhow::{bail, Context, Result};
use pkgdex_registry::{Identity, PackageMetadata, PublishOptions, Upload, Version};

use super::LocalRegistry;

/// Run `pkgdex create <name> --owner <id>`.
pub fn create(local: &LocalRegistry, name: &str, owner: &str) -> Result<()> {
    if name.is_empty() {
        bail!("package name must not be empty");
    }
    local.registry.create_package(name, &Identity::new(owner))?;
    println!("Created package '{name}' owned by {owner}");
    Ok(())
}

/// Run `pkgdex publish <package> --archive <file> --metadata <toml> --as <id>`.
pub fn publish(
    local: &LocalRegistry,
    package: &str,
    archive: &Path,
    metadata: &Path,
    publisher: &str,
    dry_run: bool,
) -> Result<()> {
    let contents =
        std::fs::read(archive).with_context(|| format!("reading {}", archive.display()))?;
    let metadata = PackageMetadata::load(metadata)?;

    let options = PublishOptions { dry_run };
    let published = local.registry.publish(
        &Identity::new(publisher),
        package,
        Upload { contents, metadata },
        &options,
    )?;

    if dry_run {
        println!(
            "Dry run: {} {} is ready to publish.",
            package, published.version
        );
    } else {
        println!("{} {} created successfully.", package, published.version);
    }
    Ok(())
}

/// Run `pkgdex versions <package>`.
pub fn versions(local: &LocalRegistry, package: &str) -> Result<()> {
    let latest = local.registry.package(package)?.latest_version;
    let versions = local.registry.list_versions(package)?;

    if versions.is_empty() {
        println!("{package} has no versions.");
        return Ok(());
    }

    for pv in versions {
        let marker = if Some(&pv.version) == latest.as_ref() {
            " (latest)"
        } else {
            ""
        };
        match pv.sort_order {
            Some(rank) => println!("  {:<24} #{rank}{marker}", pv.version),
            None => println!("  {:<24} unranked{marker}", pv.version),
        }
    }
    Ok(())
}

/// Run `pkgdex show <package> <version>`.
pub fn show(local: &LocalRegistry, package: &str, version: &str) -> Result<()> {
    let version = parse_version(version)?;
    let pv = local.registry.version(package, &version)?;
    print!("{}", pv.metadata.to_toml()?);
    println!("# contents = {}", pv.contents);
    Ok(())
}

/// Run `pkgdex fetch <package> <version> -o <file>`.
pub fn fetch(local: &LocalRegistry, package: &str, version: &str, output: &Path) -> Result<()> {
    let version = parse_version(version)?;
    let bytes = local.registry.contents(package, &version)?;
    std::fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Wrote {package}-{version} ({} bytes) to {}",
        bytes.len(),
        output.display()
    );
    Ok(())
}

/// Run `pkgdex reconcile <package>`.
pub fn reconcile(local: &LocalRegistry, package: &str) -> Result<()> {
    let report = local.registry.reconcile(package)?;
    println!(
        "Reconciled {}: {} versions, {} renumbered",
        report.package, report.versions, report.renumbered
    );
    Ok(())
}

fn parse_version(s: &str) -> Result<Version> {
    Version::parse(s).with_context(|| format!("invalid version: {s}"))
}
