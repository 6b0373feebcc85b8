// tests/doctree.rs
//
// Tree-parser fixtures: declarations, mutations, actions and the record
// fallback, over a captured-shape tree frame.

use sei_scrape::config::Settings;
use sei_scrape::model::{Category, Process};
use sei_scrape::scrape::doctree::parse_documents;

fn settings() -> Settings {
    Settings {
        org: "28".into(),
        unit: "UNIT".into(),
        base_url: "https://sei.example".into(),
        ..Default::default()
    }
}

fn process() -> Process {
    Process {
        number: "0001.02.0000003/2025-04".into(),
        procedure_id: "PROC-001".into(),
        url: "https://sei.example/sei/controlador.php?acao=procedimento_trabalhar&id_procedimento=PROC-001".into(),
        seen: false,
        category: Category::Received,
        title: None,
        kind: None,
        assignee_name: None,
        assignee_id: None,
        markers: Vec::new(),
        has_new_documents: false,
        has_notes: false,
        hash: String::new(),
        documents: Vec::new(),
        confidential: false,
        signers: Vec::new(),
        metadata: Default::default(),
    }
}

// Two valid document declarations, one declaration with too few arguments,
// one non-document node, mutations (including one aimed at an undeclared
// slot) and the two meaningful action kinds.
const SAMPLE_FRAME: &str = r#"
<html>
  <body>
    <script type="text/javascript">
      Nos[0] = new infraArvoreNo('DOCUMENTO','DOC-001','ROOT','/sei/controlador.php?acao=documento_visualizar&id_documento=DOC-001&infra_hash=hash001','ifrVisualizar','','Oficio de Teste (0001)','/sei/img/documento_pdf.svg','','','','','','','noVisitado','0001');
      Nos[1] = new infraArvoreNo('DOCUMENTO','DOC-002','ROOT','/sei/controlador.php?acao=documento_visualizar&id_documento=DOC-002&infra_hash=hash002','ifrVisualizar','','Anexo Plano (0002)','/sei/img/documento_pdf.svg','','','','','','','','0002');
      Nos[2] = new infraArvoreNo('DOCUMENTO','DOC-BAD');
      Nos[3] = new infraArvoreNo('PASTA','PASTA-01','ROOT','','','','Pasta 1','/sei/img/pasta.svg','','','','','','','','');
      Nos[0].src = '/sei/controlador.php?acao=documento_download_anexo&id_anexo=ANX-001';
      Nos[0].html = "<a href='/sei/controlador.php?acao=documento_visualizar&id_documento=DOC-001'>Visualizar</a>";
      Nos[1].src = '/sei/controlador.php?acao=documento_download_anexo&id_anexo=ANX-002';
      Nos[9].src = '/sei/controlador.php?acao=documento_download_anexo&id_anexo=GHOST';
      NosAcoes[0] = new infraArvoreAcao('ASSINATURA','DOC-001',"alert('Assinado por\nFulano de Tal')",null,null,null,null);
      NosAcoes[1] = new infraArvoreAcao('ASSINATURA','DOC-001',"alert('Assinado por\nFulano de Tal')",null,null,null,null);
      NosAcoes[2] = new infraArvoreAcao('NIVEL_ACESSO','DOC-002',"alert('Acesso Restrito')",null,null,null,'/sei/img/sigilo.svg');
    </script>
  </body>
</html>
"#;

#[test]
fn valid_declarations_become_documents_and_invalid_are_skipped() {
    let documents = parse_documents(&settings(), SAMPLE_FRAME, None);

    // DOC-BAD has <7 args, PASTA-01 isn't a document
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].id, "DOC-001");
    assert_eq!(documents[1].id, "DOC-002");
}

#[test]
fn declaration_fields_map_positionally() {
    let documents = parse_documents(&settings(), SAMPLE_FRAME, None);
    let doc = &documents[0];

    assert_eq!(doc.title.as_deref(), Some("Oficio de Teste (0001)"));
    assert_eq!(doc.kind.as_deref(), Some("DOCUMENTO"));
    assert_eq!(doc.parent_id.as_deref(), Some("ROOT"));
    assert_eq!(doc.hash.as_deref(), Some("hash001"));
    assert!(doc.url.as_deref().unwrap().starts_with("https://sei.example/sei/"));
    assert!(doc.is_new);
    assert_eq!(doc.indicators, vec!["noVisitado".to_string()]);
    assert_eq!(
        doc.metadata.get("icon_slug").and_then(|v| v.as_str()),
        Some("documento_pdf.svg")
    );
    assert_eq!(
        doc.metadata.get("document_number").and_then(|v| v.as_str()),
        Some("0001")
    );

    // second document: no css class marker
    assert!(!documents[1].is_new);
}

#[test]
fn mutations_attach_to_declared_slots_only() {
    let documents = parse_documents(&settings(), SAMPLE_FRAME, None);
    let doc = &documents[0];

    assert!(doc.view_url.as_deref().unwrap().contains("documento_visualizar"));
    assert!(doc.download_url.as_deref().unwrap().contains("documento_download_anexo"));

    // Nos[9] was never declared; its mutation must neither create a node
    // nor leak into the others
    assert!(documents.iter().all(|d| {
        d.download_url.as_deref().map_or(true, |u| !u.contains("GHOST"))
    }));
}

#[test]
fn signature_action_extracts_and_dedupes_signers() {
    let documents = parse_documents(&settings(), SAMPLE_FRAME, None);
    let doc = &documents[0];

    assert!(doc.signed);
    assert_eq!(doc.signers, vec!["Fulano de Tal".to_string()]);
    assert!(doc
        .metadata
        .get("signature_alert")
        .and_then(|v| v.as_str())
        .unwrap()
        .contains("Assinado por"));
}

#[test]
fn access_level_action_marks_confidential_with_annotation() {
    let documents = parse_documents(&settings(), SAMPLE_FRAME, None);
    let doc = &documents[1];

    assert!(doc.confidential);
    assert_eq!(
        doc.metadata.get("access_level").and_then(|v| v.as_str()),
        Some("Acesso Restrito")
    );
}

#[test]
fn actions_targeting_the_process_fall_back_to_it() {
    let frame = r#"
    <script>
      Nos[0] = new infraArvoreNo('DOCUMENTO','DOC-001','ROOT','','','','Doc','/sei/img/doc.svg','','','','','','','','');
      NosAcoes[0] = new infraArvoreAcao('ASSINATURA','PROC-001',"alert('Assinado por\nBeltrana de Souza')",null,null,null,null);
      NosAcoes[1] = new infraArvoreAcao('NIVEL_ACESSO','PROC-001',"alert('Processo Restrito')",null,null,null,'/sei/img/sigilo.svg');
    </script>
    "#;
    let mut proc = process();
    let documents = parse_documents(&settings(), frame, Some(&mut proc));

    assert_eq!(documents.len(), 1);
    assert_eq!(proc.signers, vec!["Beltrana de Souza".to_string()]);
    assert!(proc.confidential);
    assert_eq!(
        proc.metadata.get("access_level").and_then(|v| v.as_str()),
        Some("Processo Restrito")
    );
}

#[test]
fn empty_and_scriptless_input_yield_nothing() {
    assert!(parse_documents(&settings(), "", None).is_empty());
    assert!(parse_documents(&settings(), "<html><body><p>sem script</p></body></html>", None).is_empty());
    assert!(parse_documents(&settings(), "<script>var x = 1;</script>", None).is_empty());
}
