use super::ArtifactStore;
use crate::domain::{ContractName, Version};
use crate::error::ErrorKind;
use crate::layout::StorageLayout;
use crate::store::{InMemoryObjectStore, ObjectStore};
use std::sync::Arc;

fn setup() -> (Arc<InMemoryObjectStore>, ArtifactStore, ContractName) {
    let store = Arc::new(InMemoryObjectStore::new());
    let artifacts = ArtifactStore::new(store.clone(), StorageLayout::new("templates", "output"));
    (store, artifacts, ContractName::new("Contrato Locação").expect("name"))
}

#[test]
fn save_uploads_under_version_folder_and_creates_container() {
    let (store, artifacts, contract) = setup();
    let dir = tempfile::tempdir().expect("temp dir");
    let source = dir.path().join("contrato-locacao.pdf");
    std::fs::write(&source, b"%PDF").expect("write source");

    let name = artifacts
        .save(&contract, Version::FIRST, "contrato-locacao.pdf", &source)
        .expect("save");
    assert_eq!(name, "contratos/contrato-locacao/v1/contrato-locacao.pdf");
    assert_eq!(store.get("output", &name).expect("stored"), b"%PDF");
}

#[test]
fn save_fails_when_source_is_missing() {
    let (_store, artifacts, contract) = setup();
    let dir = tempfile::tempdir().expect("temp dir");
    let err = artifacts
        .save(&contract, Version::FIRST, "x.docx", &dir.path().join("missing.docx"))
        .expect_err("missing source");
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[test]
fn current_template_is_highest_version_with_editable_document() {
    let (store, artifacts, contract) = setup();
    store.ensure_container("output").expect("container");
    store
        .put("output", "contratos/contrato-locacao/v1/contrato-locacao.docx", b"one")
        .expect("put");
    store
        .put("output", "contratos/contrato-locacao/v2/contrato-locacao.DOCX", b"two")
        .expect("put");
    store
        .put("output", "contratos/contrato-locacao/v3/contrato-locacao.pdf", b"pdf only")
        .expect("put");

    let (version, name) = artifacts
        .latest_document(&contract)
        .expect("lookup")
        .expect("some version");
    assert_eq!(version.number(), 2);
    assert!(name.ends_with("v2/contrato-locacao.DOCX"));
    assert!(artifacts.template_exists(&contract).expect("exists"));
    assert_eq!(artifacts.load_current_template(&contract).expect("load"), b"two");
}

#[test]
fn load_without_versions_is_not_found() {
    let (_store, artifacts, contract) = setup();
    assert!(!artifacts.template_exists(&contract).expect("exists"));
    let err = artifacts.load_current_template(&contract).expect_err("nothing stored");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn base_template_goes_to_templates_container() {
    let (store, artifacts, contract) = setup();
    artifacts
        .save_current_template(&contract, b"PK")
        .expect("save base");
    assert_eq!(store.get("templates", "contrato-locacao.docx").expect("get"), b"PK");
    assert!(!artifacts.template_exists(&contract).expect("exists"));
    let err = artifacts.save_current_template(&contract, b"").expect_err("empty");
    assert_eq!(err.kind(), ErrorKind::Validation);
}
