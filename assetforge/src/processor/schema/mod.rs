//! FlatBuffers table decoding through the external `flatc` compiler.
//!
//! Game tables ship as text assets holding a 128-byte header followed by a
//! FlatBuffers binary. The schema files are synced from a community
//! repository and the compiler itself is fetched from its release page when
//! it is not already available.

mod github;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};
use std::process::{Command, Stdio};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{
    file_safe_name, write_output, BundleContext, BundleState, ProcessorError, ProcessorResult,
    RecordProcessor,
};
use crate::bundle::{RecordInfo, RecordKind};
use crate::paths;
use crate::unpack::unpack_zip;

pub use github::{pick_flatc_asset, GitHubClient, ReleaseAsset, TreeEntry};

/// Bytes preceding the FlatBuffers payload in a table asset.
pub const HEADER_LEN: usize = 128;

const TOOL: &str = "flatc";
const FLATC_OWNER: &str = "google";
const FLATC_REPO: &str = "flatbuffers";
const FBS_OWNER: &str = "MooncellWiki";
const FBS_REPO: &str = "OpenArknightsFBS";
const SHA_SUFFIX: &str = "._sha1_hash";
/// Table assets may carry a hash suffix of this length after the schema name.
const NAME_SUFFIX_LEN: usize = 6;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A schema file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    /// File stem, e.g. `character_table`.
    pub name: String,
    pub path: PathBuf,
}

/// Schema branch for a version folder: global builds use `YoStar`.
pub fn branch_for(version_name: &str) -> &'static str {
    if version_name.starts_with("GL") {
        "YoStar"
    } else {
        "main"
    }
}

/// The single schema `record_name` belongs to.
///
/// A schema matches when the name starts with it and the remainder is empty
/// or exactly the hash suffix. Ambiguous names match nothing.
pub fn match_schema<'a>(schemas: &'a [SchemaFile], record_name: &str) -> Option<&'a SchemaFile> {
    let mut matches = schemas.iter().filter(|s| {
        record_name.starts_with(&s.name)
            && matches!(record_name.len() - s.name.len(), 0 | NAME_SUFFIX_LEN)
    });
    let first = matches.next()?;
    match matches.next() {
        None => Some(first),
        Some(_) => None,
    }
}

/// Where schema files come from.
pub trait SchemaSource {
    fn list(&self, branch: &str) -> ProcessorResult<Vec<TreeEntry>>;
    fn fetch(&self, branch: &str, path: &str) -> ProcessorResult<Vec<u8>>;
}

impl SchemaSource for GitHubClient {
    fn list(&self, branch: &str) -> ProcessorResult<Vec<TreeEntry>> {
        self.tree(FBS_OWNER, FBS_REPO, branch)
    }

    fn fetch(&self, branch: &str, path: &str) -> ProcessorResult<Vec<u8>> {
        self.raw_file(FBS_OWNER, FBS_REPO, branch, path)
    }
}

fn sidecar_path(schema: &Path) -> PathBuf {
    let mut path = schema.as_os_str().to_owned();
    path.push(SHA_SUFFIX);
    PathBuf::from(path)
}

fn is_current(schema: &Path, sha: &str) -> bool {
    schema.is_file()
        && fs::read_to_string(sidecar_path(schema)).is_ok_and(|stored| stored.trim() == sha)
}

/// Mirror every `.fbs` file of `branch` into `dir`.
///
/// Files whose sidecar hash matches the listing are not downloaded again.
pub fn sync_schemas(
    source: &dyn SchemaSource,
    dir: &Path,
    branch: &str,
) -> ProcessorResult<Vec<SchemaFile>> {
    let write_failed = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ProcessorError::Write { path, source }
    };
    fs::create_dir_all(dir).map_err(write_failed(dir))?;

    let mut schemas = Vec::new();
    let mut fetched = 0;
    for entry in source.list(branch)? {
        if entry.kind != "blob" || !entry.path.ends_with(".fbs") {
            continue;
        }
        let relative = Path::new(&entry.path);
        let (Some(file_name), Some(stem)) = (relative.file_name(), relative.file_stem()) else {
            continue;
        };
        let path = dir.join(file_name);

        if !is_current(&path, &entry.sha) {
            let data = source.fetch(branch, &entry.path)?;
            fs::write(&path, data).map_err(write_failed(&path))?;
            let sidecar = sidecar_path(&path);
            fs::write(&sidecar, &entry.sha).map_err(write_failed(&sidecar))?;
            fetched += 1;
        }
        schemas.push(SchemaFile {
            name: stem.to_string_lossy().to_string(),
            path,
        });
    }

    schemas.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!(branch, total = schemas.len(), fetched, "Schema files synced");
    Ok(schemas)
}

/// A file named `flatc` (any extension) directly inside `dir`.
fn find_flatc(dir: &Path) -> ProcessorResult<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ProcessorError::Setup(format!("cannot list {}: {}", dir.display(), e))),
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_stem().is_some_and(|s| s == TOOL))
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> ProcessorResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let failed = |source| ProcessorError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut permissions = fs::metadata(path).map_err(failed)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions).map_err(failed)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> ProcessorResult<()> {
    Ok(())
}

/// Processor key `flatc`.
pub struct SchemaProcessor {
    working_dir: PathBuf,
    branch: &'static str,
    configured_flatc: Option<PathBuf>,
    timeout: Duration,
    flatc: Option<PathBuf>,
    schemas: Vec<SchemaFile>,
}

impl SchemaProcessor {
    /// Processor for a version folder named `version_name`; tools and
    /// schemas are resolved under `working_dir` at initialization.
    pub fn new(working_dir: impl Into<PathBuf>, version_name: &str) -> Self {
        Self {
            working_dir: working_dir.into(),
            branch: branch_for(version_name),
            configured_flatc: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            flatc: None,
            schemas: Vec::new(),
        }
    }

    /// Use this compiler instead of searching for one.
    pub fn with_flatc_path(mut self, path: Option<PathBuf>) -> Self {
        self.configured_flatc = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A ready processor using a known compiler and schema set; initialization
    /// does no network access.
    pub fn with_tool(flatc: PathBuf, schemas: Vec<SchemaFile>) -> Self {
        Self {
            working_dir: PathBuf::new(),
            branch: "main",
            configured_flatc: Some(flatc.clone()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            flatc: Some(flatc),
            schemas,
        }
    }

    pub fn branch(&self) -> &str {
        self.branch
    }

    pub fn schemas(&self) -> &[SchemaFile] {
        &self.schemas
    }

    /// `fbs_files/<branch>` under the working directory.
    pub fn schema_dir(&self) -> PathBuf {
        self.working_dir.join(paths::FBS).join(self.branch)
    }

    fn locate_flatc(&self, github: &GitHubClient) -> ProcessorResult<PathBuf> {
        if let Some(path) = &self.configured_flatc {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(ProcessorError::Setup(format!(
                "configured flatc {} does not exist",
                path.display()
            )));
        }
        if let Some(found) = find_flatc(&self.working_dir)? {
            return Ok(found);
        }

        let assets = github.latest_release_assets(FLATC_OWNER, FLATC_REPO)?;
        let asset = pick_flatc_asset(&assets, std::env::consts::OS, std::env::consts::ARCH)
            .ok_or_else(|| {
                ProcessorError::Setup(format!(
                    "no prebuilt flatc for {}-{}; place one in {}",
                    std::env::consts::OS,
                    std::env::consts::ARCH,
                    self.working_dir.display()
                ))
            })?;
        tracing::info!(asset = %asset.name, "Downloading schema compiler");

        let archive_bytes = github.download(&asset.browser_download_url)?;
        let scratch_failed =
            |e: std::io::Error| ProcessorError::Setup(format!("cannot stage flatc archive: {}", e));
        let mut archive = tempfile::NamedTempFile::new().map_err(scratch_failed)?;
        archive.write_all(&archive_bytes).map_err(scratch_failed)?;
        archive.flush().map_err(scratch_failed)?;

        unpack_zip(archive.path(), &self.working_dir, "", &CancellationToken::new())
            .map_err(|e| ProcessorError::Setup(e.to_string()))?;
        let flatc = find_flatc(&self.working_dir)?.ok_or_else(|| {
            ProcessorError::Setup(format!("{} contains no flatc binary", asset.name))
        })?;
        make_executable(&flatc)?;
        Ok(flatc)
    }
}

impl RecordProcessor for SchemaProcessor {
    fn key(&self) -> &'static str {
        TOOL
    }

    fn description(&self) -> &'static str {
        "Game tables (FlatBuffers binaries decoded to JSON by flatc)"
    }

    fn initialize(&mut self) -> ProcessorResult<()> {
        if self.flatc.is_some() && !self.schemas.is_empty() {
            return Ok(());
        }

        let github = GitHubClient::new(self.timeout)?;
        let flatc = self.locate_flatc(&github)?;
        let schemas = sync_schemas(&github, &self.schema_dir(), self.branch)?;
        if schemas.is_empty() {
            return Err(ProcessorError::Setup(format!(
                "no schema files on branch {}",
                self.branch
            )));
        }

        tracing::info!(flatc = %flatc.display(), schemas = schemas.len(), "Schema processor ready");
        self.flatc = Some(flatc);
        self.schemas = schemas;
        Ok(())
    }

    fn process(
        &self,
        ctx: &BundleContext<'_>,
        record: &RecordInfo,
        _state: &mut BundleState,
    ) -> ProcessorResult<()> {
        if record.kind != RecordKind::TextAsset {
            return Ok(());
        }
        let Some(flatc) = &self.flatc else {
            return Ok(());
        };
        let Some(schema) = match_schema(&self.schemas, &record.name) else {
            return Ok(());
        };

        let asset = ctx.container.text_asset(record.id)?;
        if asset.data.len() < HEADER_LEN {
            return Err(ProcessorError::Unsupported(format!(
                "table '{}' is shorter than its {}-byte header",
                asset.name, HEADER_LEN
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix("assetforge-fbs")
            .tempdir()
            .map_err(|source| ProcessorError::Write {
                path: std::env::temp_dir(),
                source,
            })?;
        let binary = scratch
            .path()
            .join(format!("{}.bin", file_safe_name(&asset.name)));
        write_output(&binary, &asset.data[HEADER_LEN..])?;
        fs::create_dir_all(&ctx.output_dir).map_err(|source| ProcessorError::Write {
            path: ctx.output_dir.clone(),
            source,
        })?;

        // flatc treats -o as a prefix
        let mut out_dir = ctx.output_dir.clone().into_os_string();
        out_dir.push(MAIN_SEPARATOR_STR);

        let output = Command::new(flatc)
            .arg("--raw-binary")
            .arg("--strict-json")
            .arg("-o")
            .arg(&out_dir)
            .arg("-t")
            .arg(&schema.path)
            .arg("--")
            .arg(&binary)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ProcessorError::Setup(format!("cannot run {}: {}", flatc.display(), e)))?;

        if !output.status.success() {
            return Err(ProcessorError::ToolFailed {
                tool: TOOL.to_string(),
                record: asset.name,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::debug!(record = %asset.name, schema = %schema.name, "Table decoded");
        Ok(())
    }
}
