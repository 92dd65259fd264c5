use crate::error::Result;
use crate::file::{self, File};
use crate::finder::Dependency;
use crate::pipeline::Pipeline;
use crate::util::{asset_path_for, is_vendor_path};

/// The fixed output split for one entry point: project script code, external
/// package code, and everything that is not script-like.
#[derive(Debug, Default)]
pub struct Partition {
    pub bundle: Vec<Dependency>,
    pub vendor: Vec<Dependency>,
    pub assets: Vec<Dependency>,
}

pub fn is_script_extension(extension: &str) -> bool {
    matches!(extension, "js" | "node")
}

/// Split a dependency list by vendor location and peeked terminal extension.
/// Pure over the list and the peek oracle; no file contents are read. Each
/// partitioned dependency carries the extension chain the oracle computed,
/// and routing decisions consult its terminal entry.
pub fn partition(deps: &[Dependency], pipeline: &Pipeline) -> Result<Partition> {
    let mut out = Partition::default();

    for dep in deps {
        if dep.is_virtual() {
            continue;
        }
        let mut dep = dep.clone();
        dep.set_extensions(pipeline.peek_chain(dep.file())?);
        let script = dep
            .extensions()
            .last()
            .is_some_and(|ext| is_script_extension(ext));
        if script {
            if is_vendor_path(dep.file().path()) {
                out.vendor.push(dep);
            } else {
                out.bundle.push(dep);
            }
        } else {
            out.assets.push(dep);
        }
    }

    Ok(out)
}

/// Bundle and vendor output files for an entry point.
pub fn entry_targets(output_dir: &str, entry: &File) -> (File, File) {
    let stem = entry.basename();
    let bundle = File::new(file::join(output_dir, &format!("{stem}.js")));
    let vendor = File::new(file::join(output_dir, &format!("{stem}.vendor.js")));
    (bundle, vendor)
}

/// Output file for an asset: source root stripped, extension replaced by the
/// peeked terminal extension.
pub fn asset_target(
    output_dir: &str,
    source_root: &str,
    asset: &File,
    terminal_extension: &str,
) -> File {
    let rel = File::new(asset_path_for(asset, source_root)).with_extension(terminal_extension);
    File::new(file::join(output_dir, rel.path()))
}
