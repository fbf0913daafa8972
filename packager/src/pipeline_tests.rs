//! Tests for pipeline orchestration over an in-memory registry and a fake
//! browser.

use super::*;
use crate::config::{KeyMaterial, RegistryConfig};
use crate::registry::{InMemoryVersionStore, RetryPolicy};
use crate::test_utils::{CRX_MAGIC, FakeChromium};
use rstest::{fixture, rstest};
use std::fs;
use tempfile::TempDir;

const KEY: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA";

struct Checkout {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Checkout {
    fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, contents).expect("write");
        path
    }

    fn with_local_data_files(self) -> Self {
        self.write(
            "manifests/local-data-files-updater/default-manifest.json",
            &format!(r#"{{"description":"d","key":"{KEY}","manifest_version":2,"name":"n","version":"0.0.0"}}"#),
        );
        self.write("node_modules/autoplay-whitelist/data/AutoplayWhitelist.dat", "a");
        self.write("node_modules/extension-whitelist/data/ExtensionWhitelist.dat", "e");
        self.write("node_modules/brave-site-specific-scripts/Greaselion.json", "[]");
        self.write("node_modules/referrer-whitelist/data/ReferrerWhitelist.json", "{}");
        self
    }

    fn with_model_parameter_resources(self) -> Self {
        for locale in ["US", "GB"] {
            self.write(
                &format!("build/client-model-parameters/resources/{locale}/parameters.json"),
                &format!(r#"{{"locale":"{locale}"}}"#),
            );
            self.write(&format!("keys/client-model-parameters-{locale}.pem"), "key");
        }
        self
    }

    fn config(&self, key_material: KeyMaterial, fail_fast: bool) -> PackagerConfig {
        PackagerConfig {
            packager_binary: self.write("bin/chromium", "#!/bin/sh\n"),
            key_material,
            registry: RegistryConfig {
                endpoint: "http://localhost:8000".to_owned(),
                region: "us-east-2".to_owned(),
                table: "Extensions".to_owned(),
                retry: RetryPolicy::immediate(),
            },
            source_root: self.root.clone(),
            build_root: self.root.join("build"),
            fail_fast,
        }
    }

    fn key_file(&self) -> KeyMaterial {
        KeyMaterial::File(self.write("key.pem", "key"))
    }

    fn keys_dir(&self) -> KeyMaterial {
        KeyMaterial::Directory(self.root.join("keys"))
    }
}

#[fixture]
fn checkout() -> Checkout {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().canonicalize().expect("canonical")).expect("utf8");
    Checkout { _dir: dir, root }
}

fn pipeline(
    config: PackagerConfig,
    store: InMemoryVersionStore,
    chromium: FakeChromium,
) -> Pipeline<InMemoryVersionStore, FakeChromium> {
    Pipeline::new(
        config,
        RegistryClient::new(store, RetryPolicy::immediate()),
        chromium,
    )
}

fn default_id() -> ComponentId {
    ComponentId::from_public_key(KEY).expect("valid key")
}

fn locale_id(locale: &str) -> ComponentId {
    let entry = crate::component::rules::MODEL_PARAMETER_LOCALES
        .iter()
        .find(|entry| entry.locale == locale)
        .expect("known locale");
    ComponentId::try_from(entry.id).expect("valid id")
}

#[rstest]
fn packages_local_data_files_with_next_version(checkout: Checkout) {
    let checkout = checkout.with_local_data_files();
    let store = InMemoryVersionStore::new().with_version(&default_id(), "1.2.3");
    let pipeline = pipeline(checkout.config(checkout.key_file(), false), store, FakeChromium::new());

    let report = pipeline
        .run(ComponentType::LocalDataFilesUpdater)
        .expect("run completes");

    assert_eq!(report.entries().len(), 1);
    let entry = &report.entries()[0];
    let VariantOutcome::Packaged { version, archive } = &entry.outcome else {
        panic!("expected packaged outcome, got {:?}", entry.outcome);
    };
    assert_eq!(version.to_string(), "1.2.4");
    assert_eq!(
        *archive,
        checkout
            .root
            .join("build/local-data-files-updater/local-data-files-updater-default.crx")
    );
    let bytes = fs::read(archive).expect("archive");
    assert!(bytes.starts_with(CRX_MAGIC));
    assert!(String::from_utf8_lossy(&bytes).contains("\"version\":\"1.2.4\""));
    assert_eq!(pipeline.executor().calls().len(), 1);
    assert_eq!(pipeline.registry().store().version(&default_id()).as_deref(), Some("1.2.4"));
    assert!(
        checkout
            .root
            .join("build/local-data-files-updater/default/1/Greaselion.json")
            .is_file()
    );
}

#[rstest]
fn consecutive_runs_issue_increasing_versions(checkout: Checkout) {
    let checkout = checkout.with_local_data_files();
    let pipeline = pipeline(
        checkout.config(checkout.key_file(), false),
        InMemoryVersionStore::new(),
        FakeChromium::new(),
    );

    let versions: Vec<String> = (0..3)
        .map(|_| {
            let report = pipeline
                .run(ComponentType::LocalDataFilesUpdater)
                .expect("run completes");
            match &report.entries()[0].outcome {
                VariantOutcome::Packaged { version, .. } => version.to_string(),
                other => panic!("expected packaged outcome, got {other:?}"),
            }
        })
        .collect();

    assert_eq!(versions, ["1.0.0", "1.0.1", "1.0.2"]);
    assert_eq!(pipeline.registry().store().create_table_calls(), 3);
}

#[rstest]
fn missing_private_key_aborts_before_any_writes(checkout: Checkout) {
    let checkout = checkout.with_model_parameter_resources();
    fs::remove_file(checkout.root.join("keys/client-model-parameters-GB.pem")).expect("remove");
    let pipeline = pipeline(
        checkout.config(checkout.keys_dir(), false),
        InMemoryVersionStore::new(),
        FakeChromium::new(),
    );

    let err = pipeline
        .run(ComponentType::ClientModelParameters)
        .expect_err("configuration error");

    assert!(matches!(err, PackagerError::PrivateKeyUnreadable { ref path, .. }
        if path.as_str().ends_with("client-model-parameters-GB.pem")));
    assert_eq!(pipeline.registry().store().create_table_calls(), 0);
    assert_eq!(pipeline.registry().store().write_count(), 0);
    assert!(!checkout.root.join("build/client-model-parameters/manifest-files").exists());
    assert!(pipeline.executor().calls().is_empty());
}

#[rstest]
fn missing_binary_aborts_before_any_writes(checkout: Checkout) {
    let checkout = checkout.with_local_data_files();
    let mut config = checkout.config(checkout.key_file(), false);
    config.packager_binary = checkout.root.join("bin/missing-chromium");
    let pipeline = pipeline(config, InMemoryVersionStore::new(), FakeChromium::new());

    let err = pipeline
        .run(ComponentType::LocalDataFilesUpdater)
        .expect_err("configuration error");

    assert!(matches!(err, PackagerError::MissingBinary { .. }));
    assert!(!pipeline.registry().store().table_exists());
}

#[rstest]
fn model_parameters_package_every_locale(checkout: Checkout) {
    let checkout = checkout.with_model_parameter_resources();
    let pipeline = pipeline(
        checkout.config(checkout.keys_dir(), false),
        InMemoryVersionStore::new(),
        FakeChromium::new(),
    );

    let report = pipeline
        .run(ComponentType::ClientModelParameters)
        .expect("run completes");

    assert_eq!(report.packaged_count(), 2);
    assert!(!report.has_failures());
    for locale in ["US", "GB"] {
        assert!(
            checkout
                .root
                .join(format!(
                    "build/client-model-parameters/client-model-parameters-{locale}.crx"
                ))
                .is_file()
        );
        assert!(
            checkout
                .root
                .join(format!("build/client-model-parameters/manifest-files/{locale}-manifest.json"))
                .is_file()
        );
        assert_eq!(
            pipeline.registry().store().version(&locale_id(locale)).as_deref(),
            Some("1.0.0")
        );
    }
    let calls = pipeline.executor().calls();
    assert_eq!(calls.len(), 2);
    assert!(
        calls[0].args[1].ends_with("keys/client-model-parameters-US.pem"),
        "per-identity key expected: {:?}",
        calls[0].args
    );
}

#[rstest]
fn one_identity_failing_leaves_the_other_packaged(checkout: Checkout) {
    let checkout = checkout.with_model_parameter_resources();
    let chromium = FakeChromium::new().failing_for("client-model-parameters/GB", "bad key\n");
    let store = InMemoryVersionStore::new().with_version(&locale_id("US"), "3.1.4");
    let pipeline = pipeline(checkout.config(checkout.keys_dir(), false), store, chromium);

    let report = pipeline
        .run(ComponentType::ClientModelParameters)
        .expect("run completes");

    assert!(report.has_failures());
    let [us, gb] = report.entries() else {
        panic!("expected two identities");
    };
    assert!(matches!(&us.outcome, VariantOutcome::Packaged { version, .. } if version.to_string() == "3.1.5"));
    assert!(matches!(
        &gb.outcome,
        VariantOutcome::Failed { error: PackagerError::PackagerFailed { stderr, .. } } if stderr == "bad key\n"
    ));
    assert_eq!(
        pipeline.registry().store().version(&locale_id("US")).as_deref(),
        Some("3.1.5")
    );
}

#[rstest]
fn fail_fast_skips_remaining_identities(checkout: Checkout) {
    let checkout = checkout.with_model_parameter_resources();
    let chromium = FakeChromium::new().failing_for("client-model-parameters/US", "crash\n");
    let pipeline = pipeline(
        checkout.config(checkout.keys_dir(), true),
        InMemoryVersionStore::new(),
        chromium,
    );

    let report = pipeline
        .run(ComponentType::ClientModelParameters)
        .expect("run completes");

    let [us, gb] = report.entries() else {
        panic!("expected two identities");
    };
    assert!(matches!(us.outcome, VariantOutcome::Failed { .. }));
    assert!(matches!(gb.outcome, VariantOutcome::Skipped));
    assert_eq!(pipeline.registry().store().version(&locale_id("GB")), None);
    assert_eq!(pipeline.executor().calls().len(), 1);
}

#[rstest]
fn missing_payload_fails_only_that_identity(checkout: Checkout) {
    let checkout = checkout.with_model_parameter_resources();
    fs::remove_dir_all(checkout.root.join("build/client-model-parameters/resources/US"))
        .expect("remove");
    let store = InMemoryVersionStore::new()
        .with_version(&locale_id("US"), "2.0.0")
        .with_version(&locale_id("GB"), "0.9.0");
    let pipeline = pipeline(checkout.config(checkout.keys_dir(), false), store, FakeChromium::new());

    let report = pipeline
        .run(ComponentType::ClientModelParameters)
        .expect("run completes");

    let [us, gb] = report.entries() else {
        panic!("expected two identities");
    };
    assert!(matches!(
        &us.outcome,
        VariantOutcome::Failed { error: PackagerError::SourceMissing { .. } }
    ));
    assert!(matches!(&gb.outcome, VariantOutcome::Packaged { version, .. } if version.to_string() == "0.9.1"));
    let store = pipeline.registry().store();
    // Reservation precedes staging, so the failed identity still consumed a version.
    assert_eq!(store.version(&locale_id("US")).as_deref(), Some("2.0.1"));
    assert_eq!(store.version(&locale_id("GB")).as_deref(), Some("0.9.1"));
    assert!(!checkout.root.join("build/client-model-parameters/client-model-parameters-US.crx").exists());
}

#[rstest]
fn registry_outage_is_reported_per_identity(checkout: Checkout) {
    let checkout = checkout.with_local_data_files();
    let store = InMemoryVersionStore::new();
    store.fail_next_reads(5);
    let pipeline = pipeline(checkout.config(checkout.key_file(), false), store, FakeChromium::new());

    let report = pipeline
        .run(ComponentType::LocalDataFilesUpdater)
        .expect("run completes");

    assert!(matches!(
        &report.entries()[0].outcome,
        VariantOutcome::Failed { error: PackagerError::RegistryUnavailable { attempts: 3, .. } }
    ));
    assert!(pipeline.executor().calls().is_empty());
}
