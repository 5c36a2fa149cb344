// tests/integration_test.rs

//! Integration tests for Widgetron
//!
//! These tests drive an `EnvironmentDescriptor` through its lifecycle with
//! in-process package index and package manager implementations.

use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use widgetron::baseline::{Requirement, RequiredBaseline};
use widgetron::channel::ChannelRegistry;
use widgetron::descriptor::{DESCRIPTOR_FILE, DescriptorInputs, EnvironmentDescriptor, Toolchain};
use widgetron::environment::{PackageManager, SpecSource};
use widgetron::repository::{IndexRecord, PackageIndex, RepodataIndex};
use widgetron::resolver::{AmbiguityPolicy, Constraints};
use widgetron::{Error, Result};

const PACKAGE: &str = "widgetron_app";
const REMOTE_URL: &str = "https://example.com/builds/noarch/widgetron_app-1.2.0-py_0.tar.bz2";

/// Serves one build of every queried package
struct StaticIndex;

impl PackageIndex for StaticIndex {
    fn query(&self, _channel: &str, package: &str) -> Result<Vec<IndexRecord>> {
        let mut record = IndexRecord::new(package, "1.2.0", "py_0");
        record.url = Some(REMOTE_URL.to_string());
        record.md5 = Some("0123456789abcdef0123456789abcdef".to_string());
        Ok(vec![record])
    }
}

type Calls = Rc<RefCell<Vec<(PathBuf, Vec<String>)>>>;

struct RecordingInstaller {
    calls: Calls,
    status: i32,
}

impl PackageManager for RecordingInstaller {
    fn install(&self, prefix: &Path, specs: &[String], _channels: &[String]) -> Result<i32> {
        self.calls
            .borrow_mut()
            .push((prefix.to_path_buf(), specs.to_vec()));
        Ok(self.status)
    }
}

fn toolchain_with(index: Box<dyn PackageIndex>, status: i32) -> (Toolchain, Calls) {
    let calls = Calls::default();
    let toolchain = Toolchain {
        registry: ChannelRegistry::new("/nonexistent/conda-bld"),
        index,
        installer: Box::new(RecordingInstaller {
            calls: calls.clone(),
            status,
        }),
        ambiguity: AmbiguityPolicy::FirstMatch,
    };
    (toolchain, calls)
}

fn toolchain() -> (Toolchain, Calls) {
    toolchain_with(Box::new(StaticIndex), 0)
}

fn inputs(root: &Path) -> DescriptorInputs {
    let mut inputs = DescriptorInputs::new("Demo", "0.1.0", root.join("tmp").join("constructor"));
    inputs.baseline = RequiredBaseline::new(vec![Requirement::new("jupyterlab", ">=3")]);
    inputs.channels = vec!["conda-forge".to_string()];
    inputs
}

fn attrs() -> Constraints {
    Constraints::from([("version".to_string(), "1.2.0".to_string())])
}

/// Write a `conda-meta` record and the files it lists
fn install_record(prefix: &Path, name: &str, version: &str, files: &[&str]) -> PathBuf {
    let meta = prefix.join("conda-meta");
    fs::create_dir_all(&meta).unwrap();
    for file in files {
        let path = prefix.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, name).unwrap();
    }
    let record = meta.join(format!("{}-{}-0.json", name, version));
    let body = serde_json::json!({
        "name": name,
        "version": version,
        "build": "0",
        "files": files,
    });
    fs::write(&record, body.to_string()).unwrap();
    record
}

#[test]
fn test_conflicting_sources_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("environment.yml");
    let lock = dir.path().join("lock.txt");
    fs::write(&manifest, "dependencies:\n  - jupyterlab\n").unwrap();
    fs::write(&lock, "@EXPLICIT\n").unwrap();

    let mut inputs = inputs(dir.path());
    inputs.environment_yaml = Some(manifest);
    inputs.explicit_lock = Some(lock);
    let work_dir = inputs.work_dir.clone();

    let err = EnvironmentDescriptor::new(inputs, toolchain().0).err().unwrap();
    match err {
        Error::ConflictingSpecSources(names) => {
            assert_eq!(names, vec!["environment_yaml", "explicit_lock"])
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!work_dir.join(DESCRIPTOR_FILE).exists());
}

#[test]
fn test_missing_baseline_package_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = inputs(dir.path());
    inputs.dependencies = vec!["numpy".to_string()];
    let work_dir = inputs.work_dir.clone();

    let err = EnvironmentDescriptor::new(inputs, toolchain().0).err().unwrap();
    assert!(err.to_string().contains("jupyterlab >=3"));
    assert!(!work_dir.join(DESCRIPTOR_FILE).exists());
}

#[test]
fn test_serialization_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = inputs(dir.path());
    inputs.dependencies = vec!["jupyterlab >=3".to_string(), "numpy".to_string()];
    inputs.install_path = Some("/opt/demo".to_string());
    let descriptor = EnvironmentDescriptor::new(inputs, toolchain().0).unwrap();

    let path = descriptor.serialize().unwrap();
    let first = fs::read(&path).unwrap();
    descriptor.serialize().unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);

    let text = String::from_utf8(first).unwrap();
    assert!(text.contains("default_prefix: /opt/demo"));
    for internal in ["install_path", "install_missing", "explicit_lock", "environment_yaml"] {
        assert!(!text.contains(internal), "{internal} leaked into the descriptor");
    }
}

#[test]
fn test_lock_injection_appends_one_line_to_working_copy() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dir.path().join("lock.txt");
    let original = "# platform: linux-64\n@EXPLICIT\nhttps://conda.anaconda.org/conda-forge/noarch/jupyterlab-3.4.8-pyhd8ed1ab_0.tar.bz2#5f2a\n";
    fs::write(&lock, original).unwrap();

    let mut inputs = inputs(dir.path());
    inputs.explicit_lock = Some(lock.clone());
    let mut descriptor = EnvironmentDescriptor::new(inputs, toolchain().0).unwrap();

    let status = descriptor
        .add_dependency(PACKAGE, "my-builds", &attrs())
        .unwrap();
    assert_eq!(status, 0);

    let copy = descriptor.work_dir().join("lock.txt");
    assert_eq!(descriptor.spec_source(), &SpecSource::LockFile(copy.clone()));
    let updated = fs::read_to_string(&copy).unwrap();
    assert!(updated.starts_with(original));
    assert_eq!(
        &updated[original.len()..],
        format!("{}#0123456789abcdef0123456789abcdef\n", REMOTE_URL)
    );
    assert_eq!(fs::read_to_string(&lock).unwrap(), original);

    let written = fs::read_to_string(descriptor.descriptor_path()).unwrap();
    assert!(written.contains("environment_file:"));
    assert!(!written.contains("specs:"));
    assert!(!written.contains("channels:"));
    assert!(descriptor.channels().contains("my-builds"));
}

#[test]
fn test_environment_file_is_classified_by_content() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("env.txt");
    fs::write(
        &manifest,
        "name: demo\nchannels:\n  - conda-forge\ndependencies:\n  - jupyterlab>=3\n",
    )
    .unwrap();

    let mut inputs = inputs(dir.path());
    inputs.environment_file = Some(manifest);
    let mut descriptor = EnvironmentDescriptor::new(inputs, toolchain().0).unwrap();
    assert!(matches!(descriptor.spec_source(), SpecSource::ManifestFile(_)));

    descriptor
        .add_dependency(PACKAGE, "my-builds", &attrs())
        .unwrap();
    let copy = fs::read_to_string(descriptor.work_dir().join("env.txt")).unwrap();
    let document: serde_yaml::Value = serde_yaml::from_str(&copy).unwrap();
    assert_eq!(document["channels"][0].as_str(), Some("my-builds"));
    assert_eq!(document["dependencies"][1].as_str(), Some("widgetron_app=1.2.0"));
}

#[test]
fn test_local_channel_pin_hashes_the_package_file() {
    let dir = tempfile::tempdir().unwrap();
    let channel = dir.path().join("conda-bld");
    let noarch = channel.join("noarch");
    fs::create_dir_all(&noarch).unwrap();
    fs::write(channel.join("channeldata.json"), "{}").unwrap();
    let filename = "widgetron_app-1.2.0-py_0.tar.bz2";
    fs::write(noarch.join(filename), b"package bytes").unwrap();
    let repodata = serde_json::json!({
        "packages": {
            filename: { "name": PACKAGE, "version": "1.2.0", "build": "py_0", "build_number": 0 }
        }
    });
    fs::write(noarch.join("repodata.json"), repodata.to_string()).unwrap();

    let registry = ChannelRegistry::new(&channel);
    let index = RepodataIndex::new(registry)
        .unwrap()
        .with_subdirs(vec!["noarch".to_string()]);
    let (mut toolchain, _) = toolchain_with(Box::new(index), 0);
    toolchain.registry = ChannelRegistry::new(&channel);

    let mut inputs = inputs(dir.path());
    inputs.dependencies = vec!["jupyterlab >=3".to_string()];
    let mut descriptor = EnvironmentDescriptor::new(inputs, toolchain).unwrap();
    descriptor
        .add_dependency(PACKAGE, "local", &attrs())
        .unwrap();

    let digest = format!("{:x}", Sha256::digest(b"package bytes"));
    let specs = descriptor.spec_source().explicit_packages().unwrap();
    assert_eq!(specs.len(), 2);
    assert!(specs[1].starts_with("file:"));
    assert!(specs[1].ends_with(&format!("/noarch/{}#sha256:{}", filename, digest)));

    assert_eq!(descriptor.channels().local(), ["local".to_string()]);
    assert_eq!(descriptor.channels().non_local(), ["conda-forge".to_string()]);
    assert_eq!(descriptor.channels_remap().len(), 1);
    assert_eq!(descriptor.channels_remap()[0].src, "local");
}

#[test]
fn test_live_injection_replaces_previous_install() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("envs").join("demo");
    install_record(&prefix, "jupyterlab", "3.4.8", &[]);
    let old_files = ["lib/widgetron_app/__init__.py", "share/jupyter/labextensions/widgetron_app/package.json"];
    let old_record = install_record(&prefix, PACKAGE, "1.0.0", &old_files);

    let mut inputs = inputs(dir.path());
    inputs.environment = Some("demo".to_string());
    inputs.envs_dirs = vec![dir.path().join("envs")];
    let (toolchain, calls) = toolchain();
    let mut descriptor = EnvironmentDescriptor::new(inputs, toolchain).unwrap();
    assert_eq!(descriptor.spec_source(), &SpecSource::LiveEnvironment(prefix.clone()));

    let status = descriptor
        .add_dependency(PACKAGE, "my-builds", &attrs())
        .unwrap();
    assert_eq!(status, 0);
    assert!(!old_record.exists());
    for file in old_files {
        assert!(!prefix.join(file).exists());
    }

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (prefix.clone(), vec![REMOTE_URL.to_string()]));

    let written = fs::read_to_string(descriptor.descriptor_path()).unwrap();
    assert!(written.contains("my-builds"));
}

#[test]
fn test_failed_live_install_leaves_descriptor_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("prefix");
    install_record(&prefix, "jupyterlab", "3.4.8", &[]);

    let mut inputs = inputs(dir.path());
    inputs.environment = Some(prefix.display().to_string());
    let (toolchain, calls) = toolchain_with(Box::new(StaticIndex), 2);
    let mut descriptor = EnvironmentDescriptor::new(inputs, toolchain).unwrap();
    let before = fs::read_to_string(descriptor.descriptor_path()).unwrap();

    let status = descriptor
        .add_dependency(PACKAGE, "my-builds", &attrs())
        .unwrap();
    assert_eq!(status, 2);
    assert_eq!(calls.borrow().len(), 1);
    assert!(!descriptor.channels().contains("my-builds"));
    assert_eq!(fs::read_to_string(descriptor.descriptor_path()).unwrap(), before);
}
