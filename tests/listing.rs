// tests/listing.rs
//
// Control-page fixtures: row extraction, flags and markers, pagination
// metadata, page-advance form data and extraction idempotence.

use sei_scrape::config::Settings;
use sei_scrape::core::form::serialize_form;
use sei_scrape::model::{Category, FilterOptions};
use sei_scrape::scrape::listing::{apply_filters, extract_processes};
use sei_scrape::scrape::paging::{build_page_request, pagination_info};

fn settings() -> Settings {
    Settings {
        org: "28".into(),
        unit: "UNIT".into(),
        base_url: "https://sei.example".into(),
        ..Default::default()
    }
}

const CONTROL_PAGE: &str = r#"
<html><body>
<form id="frmProcedimentoControlar" action="controlador.php?acao=procedimento_controlar" method="post">
  <input type="hidden" id="hdnRecebidosPaginaAtual" name="hdnRecebidosPaginaAtual" value="0">
  <input type="hidden" id="hdnGeradosPaginaAtual" name="hdnGeradosPaginaAtual" value="0">
  <input type="hidden" name="hdnInfraCampoOrd" value="DtaInclusao">
  <select name="selRecebidosPaginacaoSuperior">
    <option value="0" selected>1</option>
    <option value="1">2</option>
    <option value="2">3</option>
  </select>
  <select name="selRecebidosPaginacaoInferior">
    <option value="0" selected>1</option>
    <option value="1">2</option>
    <option value="2">3</option>
  </select>

  <table id="tblProcessosRecebidos">
    <caption>Recebidos - 1 a 20 de 45 registros</caption>
    <tr id="P101">
      <td>
        <a href="controlador.php?acao=procedimento_trabalhar&id_procedimento=101&infra_hash=h101"
           class="protocoloNormal"
           onmouseover="return infraTooltipMostrar('Pagamento de bolsa','Bolsas: Concessão')">
          1500. 01. 0310980/2025-88
        </a>
        <a href="controlador.php?acao=procedimento_atribuicao_listar&id=101" title="Atribuído para Maria Souza">12345678900</a>
        <a onmouseover="return infraTooltipMostrar('Urgente','')"><img class="imagemStatus" src="/sei/img/marcador_vermelho.svg"></a>
        <img src="/sei/img/exclamacao.svg">
      </td>
    </tr>
    <tr id="P102">
      <td>
        <a href="controlador.php?acao=procedimento_trabalhar&id_procedimento=102&infra_hash=h102"
           class="processoVisualizado">1500.01.0310981/2025-69</a>
        <img src="/sei/img/anotacao_amarela.svg">
      </td>
    </tr>
    <tr id="P102dup">
      <td>
        <a href="controlador.php?acao=procedimento_trabalhar&id_procedimento=102&infra_hash=h102">1500.01.0310981/2025-69</a>
      </td>
    </tr>
    <tr id="Pbroken"><td><a href="controlador.php?acao=procedimento_trabalhar&id_procedimento=999">sem numero</a></td></tr>
    <tr id="cab"><td>header row</td></tr>
  </table>

  <table id="tblProcessosGerados">
    <caption>Gerados - 1 a 1 de 1 registro</caption>
    <tr id="P201">
      <td>
        <a href="controlador.php?acao=procedimento_trabalhar&id_procedimento=201&infra_hash=h201">1500.01.0310999/2025-10</a>
      </td>
    </tr>
  </table>
</form>
</body></html>
"#;

#[test]
fn rows_become_processes_with_flags_and_markers() {
    let processes = extract_processes(&settings(), CONTROL_PAGE);

    // P102dup collapses into P102; Pbroken has no display number
    assert_eq!(processes.len(), 3);

    let first = &processes[0];
    assert_eq!(first.number, "1500.01.0310980/2025-88");
    assert_eq!(first.procedure_id, "101");
    assert_eq!(first.hash, "h101");
    assert_eq!(first.category, Category::Received);
    assert!(!first.seen);
    assert_eq!(first.title.as_deref(), Some("Pagamento de bolsa"));
    assert_eq!(first.kind.as_deref(), Some("Bolsas: Concessão"));
    assert_eq!(first.assignee_name.as_deref(), Some("Maria Souza"));
    assert_eq!(first.assignee_id.as_deref(), Some("12345678900"));
    assert_eq!(first.markers, vec!["Urgente".to_string()]);
    assert!(first.has_new_documents);

    let second = &processes[1];
    assert!(second.seen);
    assert!(second.has_notes);
    assert!(!second.has_new_documents);

    let third = &processes[2];
    assert_eq!(third.category, Category::Generated);
}

#[test]
fn extraction_is_idempotent_and_order_preserving() {
    let once = extract_processes(&settings(), CONTROL_PAGE);
    let twice = extract_processes(&settings(), CONTROL_PAGE);
    assert_eq!(once, twice);

    let ids: Vec<&str> = once.iter().map(|p| p.procedure_id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "201"]);
}

#[test]
fn pagination_metadata_is_derived_from_the_caption() {
    let info = pagination_info(CONTROL_PAGE);
    let received = info[&Category::Received];
    assert_eq!(received.total_records, 45);
    assert_eq!(received.items_per_page, 20);
    assert_eq!(received.total_pages, 3);
    assert_eq!(received.current_page, 0);

    let generated = info[&Category::Generated];
    assert_eq!(generated.total_pages, 1);
}

#[test]
fn page_advance_changes_only_the_page_selector_fields() {
    let request = build_page_request(CONTROL_PAGE, Category::Received, 2).unwrap();
    assert_eq!(request.action, "controlador.php?acao=procedimento_controlar");
    assert_eq!(request.method, "post");

    let form_html = CONTROL_PAGE
        .split("<form")
        .nth(1)
        .map(|rest| format!("<form{}", rest))
        .unwrap();
    let baseline = serialize_form(&form_html);

    for (key, value) in &request.data {
        match key.as_str() {
            "selRecebidosPaginacaoSuperior" | "selRecebidosPaginacaoInferior"
            | "hdnRecebidosPaginaAtual" => assert_eq!(value, "2"),
            other => assert_eq!(Some(value), baseline.get(other), "field {other} changed"),
        }
    }
    assert_eq!(request.data.len(), baseline.len());
}

#[test]
fn page_advance_without_hidden_state_is_an_error() {
    let html = r#"<form id="frmProcedimentoControlar" action="x.php"><input type="text" name="q" value=""></form>"#;
    assert!(build_page_request(html, Category::Received, 1).is_err());
}

#[test]
fn filters_narrow_the_listing() {
    let processes = extract_processes(&settings(), CONTROL_PAGE);

    let unseen = apply_filters(&processes, &FilterOptions { seen: Some(false), ..Default::default() });
    assert_eq!(unseen.len(), 2);

    let generated = apply_filters(
        &processes,
        &FilterOptions { categories: Some(vec![Category::Generated]), ..Default::default() },
    );
    assert_eq!(generated.len(), 1);

    let by_assignee = apply_filters(
        &processes,
        &FilterOptions { assignees: vec!["maria".to_string()], ..Default::default() },
    );
    assert_eq!(by_assignee.len(), 1);
    assert_eq!(by_assignee[0].procedure_id, "101");
}
