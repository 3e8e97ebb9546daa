use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// Must match the slots declared in launcher/src/strings.rs.
const NAME_SLOT: Slot = Slot::new(b"@@LAUNCHER_NAME@@", 128);
const RUNTIME_HOME_SLOT: Slot = Slot::new(b"@@LAUNCHER_RUNTIME_HOME@@", 1024);
const RUNTIME_VERSION_SLOT: Slot = Slot::new(b"@@LAUNCHER_RUNTIME_VERSION@@", 64);
const MESSAGE_SIZE: usize = 512;

const MAIN_ENTRY: &str = "__main__.py";

#[derive(Debug, Clone, Copy)]
struct Slot {
    marker: &'static [u8],
    size: usize,
}

impl Slot {
    const fn new(marker: &'static [u8], size: usize) -> Self {
        Self { marker, size }
    }

    fn label(&self) -> String {
        String::from_utf8_lossy(self.marker).trim_matches('@').to_string()
    }
}

/// Which user-facing message a `--message` flag replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKey {
    HomeNotFound,
    LibraryNotFound,
    SymbolNotFound,
    ArchiveNotFound,
}

impl MessageKey {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "home-not-found" => Some(Self::HomeNotFound),
            "library-not-found" => Some(Self::LibraryNotFound),
            "symbol-not-found" => Some(Self::SymbolNotFound),
            "archive-not-found" => Some(Self::ArchiveNotFound),
            _ => None,
        }
    }

    fn slot(self) -> Slot {
        let marker: &'static [u8] = match self {
            Self::HomeNotFound => b"@@LAUNCHER_MSG_HOME_NOT_FOUND@@",
            Self::LibraryNotFound => b"@@LAUNCHER_MSG_LIBRARY_NOT_FOUND@@",
            Self::SymbolNotFound => b"@@LAUNCHER_MSG_SYMBOL_NOT_FOUND@@",
            Self::ArchiveNotFound => b"@@LAUNCHER_MSG_ARCHIVE_NOT_FOUND@@",
        };
        Slot::new(marker, MESSAGE_SIZE)
    }
}

fn parse_message(arg: &str) -> Result<(MessageKey, String), String> {
    let (key, text) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=TEXT, got '{}'", arg))?;
    let key = MessageKey::parse(key).ok_or_else(|| {
        format!(
            "unknown message '{}' (expected home-not-found, library-not-found, \
             symbol-not-found or archive-not-found)",
            key
        )
    })?;
    Ok((key, text.to_string()))
}

/// Bake settings into a launcher template and append the application archive.
#[derive(Parser, Debug)]
#[command(name = "finalize-launcher", version)]
struct Args {
    /// Unpatched launcher binary
    #[arg(long)]
    template: PathBuf,

    /// Where to write the finalized launcher
    #[arg(short, long)]
    output: PathBuf,

    /// Application name, used as the error dialog title
    #[arg(long)]
    name: Option<String>,

    /// Runtime home template, may reference %SELF% and other variables
    #[arg(long)]
    runtime_home: Option<String>,

    /// Runtime version tag, e.g. python311
    #[arg(long)]
    runtime_version: Option<String>,

    /// Replace a user-facing message (KEY=TEXT), may be repeated
    #[arg(long = "message", value_name = "KEY=TEXT", value_parser = parse_message)]
    messages: Vec<(MessageKey, String)>,

    /// Script stored as __main__.py in the archive
    #[arg(long = "main", value_name = "FILE")]
    main_script: Option<PathBuf>,

    /// File or directory to add to the archive, may be repeated
    #[arg(long = "add", value_name = "PATH")]
    add: Vec<PathBuf>,

    /// Only patch the string table, do not append an archive
    #[arg(long)]
    no_archive: bool,
}

impl Args {
    fn patches(&self) -> Vec<(Slot, &str)> {
        let mut patches = Vec::new();
        if let Some(name) = &self.name {
            patches.push((NAME_SLOT, name.as_str()));
        }
        if let Some(home) = &self.runtime_home {
            patches.push((RUNTIME_HOME_SLOT, home.as_str()));
        }
        if let Some(version) = &self.runtime_version {
            patches.push((RUNTIME_VERSION_SLOT, version.as_str()));
        }
        for (key, text) in &self.messages {
            patches.push((key.slot(), text.as_str()));
        }
        patches
    }
}

fn find_pattern(data: &[u8], pattern: &[u8]) -> Option<usize> {
    data.windows(pattern.len())
        .position(|window| window == pattern)
}

fn replace_at(data: &mut [u8], offset: usize, new_value: &[u8], fixed_size: usize) -> Result<()> {
    if new_value.len() > fixed_size {
        bail!(
            "value too long: {} bytes > {} bytes max",
            new_value.len(),
            fixed_size
        );
    }
    if offset + fixed_size > data.len() {
        bail!("slot at offset {} runs past the end of the template", offset);
    }

    data[offset..offset + fixed_size].fill(0);
    data[offset..offset + new_value.len()].copy_from_slice(new_value);

    Ok(())
}

fn patch_slot(data: &mut [u8], slot: Slot, value: &str) -> Result<()> {
    // The marker is NUL padded inside its slot.
    let mut needle = slot.marker.to_vec();
    needle.push(0);

    let pos = find_pattern(data, &needle)
        .with_context(|| format!("{} placeholder not found in template", slot.label()))?;
    replace_at(data, pos, value.as_bytes(), slot.size)
        .with_context(|| format!("cannot patch {}", slot.label()))?;

    eprintln!("Replaced {} with: {}", slot.label(), value);
    Ok(())
}

fn ensure_not_template(template: &Path, output: &Path) -> Result<()> {
    let template_canon = fs::canonicalize(template)
        .with_context(|| format!("Failed to resolve template path: {}", template.display()))?;
    let output_canon = fs::canonicalize(output).ok();

    if output_canon.as_ref() == Some(&template_canon) {
        bail!("Output path cannot be the same as template path (would overwrite input)");
    }
    Ok(())
}

fn append_archive(output: &Path, main_script: Option<&Path>, extra: &[PathBuf]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(output)
        .with_context(|| format!("Failed to reopen {}", output.display()))?;
    // Entry offsets come out relative to the start of the launcher.
    file.seek(SeekFrom::End(0))
        .context("Failed to seek to the end of the launcher")?;

    let mut zip = ZipWriter::new(file);

    if let Some(script) = main_script {
        add_file(&mut zip, script, MAIN_ENTRY)?;
    }
    for path in extra {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid archive member name: {}", path.display()))?;
        if path.is_dir() {
            add_directory_to_archive(&mut zip, path, name)?;
        } else {
            add_file(&mut zip, path, name)?;
        }
    }

    zip.finish().context("Failed to finalize archive")?;
    Ok(())
}

fn add_file<W: Write + Seek>(zip: &mut ZipWriter<W>, source: &Path, archive_path: &str) -> Result<()> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut file_handle = File::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?;
    zip.start_file(archive_path, options)
        .with_context(|| format!("Failed to add file {}", archive_path))?;
    io::copy(&mut file_handle, zip)
        .with_context(|| format!("Failed to write {}", archive_path))?;

    eprintln!("Added: {}", archive_path);
    Ok(())
}

fn add_directory_to_archive<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    source_dir: &Path,
    archive_prefix: &str,
) -> Result<()> {
    for entry in WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();

        let relative_path = path.strip_prefix(source_dir)
            .context("Failed to compute relative path")?;
        let archive_path = PathBuf::from(archive_prefix).join(relative_path);
        let archive_path_str = archive_path.to_str()
            .context("Invalid UTF-8 in path")?
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            let options = FileOptions::default().unix_permissions(0o755);
            zip.add_directory(archive_path_str.as_str(), options)
                .with_context(|| format!("Failed to add directory {}", archive_path_str))?;
            eprintln!("Added: {}/", archive_path_str);
        } else if entry.file_type().is_file() {
            add_file(zip, path, &archive_path_str)?;
        }
        // Symlinks and special files are skipped.
    }

    Ok(())
}

fn finalize_launcher(args: &Args) -> Result<()> {
    ensure_not_template(&args.template, &args.output)?;

    let mut data = fs::read(&args.template)
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;

    for (slot, value) in args.patches() {
        patch_slot(&mut data, slot, value)?;
    }

    fs::write(&args.output, &data)
        .with_context(|| format!("Failed to write output {}", args.output.display()))?;

    if !args.no_archive {
        append_archive(&args.output, args.main_script.as_deref(), &args.add)?;
    }

    // Make executable (Unix only)
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(&args.output)
            .context("Failed to get metadata")?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&args.output, perms)
            .context("Failed to set permissions")?;
    }

    eprintln!("\nFinalized launcher written to: {}", args.output.display());
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = finalize_launcher(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

    fn template_bytes() -> Vec<u8> {
        let mut data = b"\x7fELF header bytes".to_vec();
        let mut slots = vec![NAME_SLOT, RUNTIME_HOME_SLOT, RUNTIME_VERSION_SLOT];
        slots.extend([
            MessageKey::HomeNotFound,
            MessageKey::LibraryNotFound,
            MessageKey::SymbolNotFound,
            MessageKey::ArchiveNotFound,
        ].map(MessageKey::slot));
        for slot in slots {
            let mut bytes = vec![0u8; slot.size];
            bytes[..slot.marker.len()].copy_from_slice(slot.marker);
            data.extend(bytes);
        }
        data.extend(b"trailing code");
        data
    }

    fn args(template: &Path, output: &Path) -> Args {
        Args::parse_from([
            "finalize-launcher",
            "--template",
            template.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
    }

    fn slot_text(data: &[u8], offset: usize, size: usize) -> String {
        let slot = &data[offset..offset + size];
        let len = slot.iter().position(|&b| b == 0).unwrap_or(size);
        String::from_utf8_lossy(&slot[..len]).into_owned()
    }

    #[test]
    fn test_find_pattern() {
        assert_eq!(find_pattern(b"xx@@A@@yy", b"@@A@@"), Some(2));
        assert_eq!(find_pattern(b"xxyy", b"@@A@@"), None);
    }

    #[test]
    fn test_replace_at_clears_slot() {
        let mut data = *b"AAAAAAAAzz";
        replace_at(&mut data, 0, b"hi", 8).unwrap();
        assert_eq!(&data, b"hi\0\0\0\0\0\0zz");
    }

    #[test]
    fn test_replace_at_rejects_long_value() {
        let mut data = [0u8; 8];
        let err = replace_at(&mut data, 0, b"too long!", 8).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_patch_slot_missing_marker() {
        let mut data = b"no markers here".to_vec();
        let err = patch_slot(&mut data, NAME_SLOT, "App").unwrap_err();
        assert!(err.to_string().contains("LAUNCHER_NAME placeholder not found"));
    }

    #[test]
    fn test_parse_message() {
        let (key, text) = parse_message("home-not-found=Install it first").unwrap();
        assert_eq!(key, MessageKey::HomeNotFound);
        assert_eq!(text, "Install it first");

        assert!(parse_message("no-such-key=x").is_err());
        assert!(parse_message("home-not-found").is_err());
    }

    #[test]
    fn test_cli_collects_patches() {
        let args = Args::parse_from([
            "finalize-launcher",
            "--template", "t",
            "--output", "o",
            "--name", "Demo",
            "--runtime-version", "python312",
            "--message", "archive-not-found=broken",
        ]);
        let patches = args.patches();
        assert_eq!(patches.len(), 3);
        assert_eq!(patches[0].0.marker, NAME_SLOT.marker);
        assert_eq!(patches[1].1, "python312");
        assert_eq!(patches[2].0.size, MESSAGE_SIZE);
    }

    #[test]
    fn test_refuses_to_overwrite_template() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("launcher");
        fs::write(&template, template_bytes()).unwrap();

        let err = finalize_launcher(&args(&template, &template)).unwrap_err();
        assert!(err.to_string().contains("cannot be the same"));
    }

    #[test]
    fn test_finalize_patches_and_appends_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("launcher");
        let output = tmp.path().join("app");
        let script = tmp.path().join("hello.py");
        let package = tmp.path().join("pkg");
        fs::write(&template, template_bytes()).unwrap();
        fs::write(&script, "print('hello')\n").unwrap();
        fs::create_dir(&package).unwrap();
        fs::write(package.join("__init__.py"), "").unwrap();

        let mut args = args(&template, &output);
        args.name = Some("Demo".into());
        args.runtime_home = Some("%SELF%/rt".into());
        args.main_script = Some(script);
        args.add = vec![package];
        finalize_launcher(&args).unwrap();

        let data = fs::read(&output).unwrap();
        let original = template_bytes();
        let name_at = find_pattern(&original, NAME_SLOT.marker).unwrap();
        let home_at = find_pattern(&original, RUNTIME_HOME_SLOT.marker).unwrap();
        assert_eq!(slot_text(&data, name_at, NAME_SLOT.size), "Demo");
        assert_eq!(slot_text(&data, home_at, RUNTIME_HOME_SLOT.size), "%SELF%/rt");
        assert!(find_pattern(&data, RUNTIME_VERSION_SLOT.marker).is_some());

        assert_eq!(&data[data.len() - 22..data.len() - 18], &EOCD_SIGNATURE);

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut main = String::new();
        archive.by_name(MAIN_ENTRY).unwrap().read_to_string(&mut main).unwrap();
        assert_eq!(main, "print('hello')\n");
        assert!(archive.by_name("pkg/__init__.py").is_ok());

        #[cfg(unix)]
        assert_eq!(fs::metadata(&output).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn test_no_archive_keeps_size() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("launcher");
        let output = tmp.path().join("app");
        fs::write(&template, template_bytes()).unwrap();

        let mut args = args(&template, &output);
        args.no_archive = true;
        finalize_launcher(&args).unwrap();

        assert_eq!(fs::read(&output).unwrap().len(), template_bytes().len());
    }
}
