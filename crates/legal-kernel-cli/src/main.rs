use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use legal_kernel_api::{
    resolve_config, AnalyzeRequest, AssessRequest, CaseFilter, ClassifyRequest, InferRequest,
    LegalKernelApi, SearchRequest, API_CONTRACT_VERSION,
};
use legal_kernel_core::{
    Aggravator, EvidenceStrength, LegalArea, Mitigator, OffenceClass, RiskContext, SearchQuery,
    SparseVector,
};
use serde_json::Value;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "lk")]
#[command(about = "Legal Kernel CLI")]
struct Cli {
    /// YAML kernel config; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON corpus overriding the configured one.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    Infer(InferArgs),
    Classify(ClassifyArgs),
    Assess(AssessArgs),
    Search {
        #[command(subcommand)]
        command: SearchCommand,
    },
    Cases {
        #[command(subcommand)]
        command: CasesCommand,
    },
    Analyze(Box<AnalyzeArgs>),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Load every knowledge file and report what was loaded.
    Validate,
    /// Print the effective config after defaults are applied.
    Show,
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    List(RulesListArgs),
}

#[derive(Debug, Args)]
struct RulesListArgs {
    #[arg(long)]
    area: Option<String>,
}

#[derive(Debug, Args)]
struct FactArgs {
    #[arg(long = "fact")]
    facts: Vec<String>,
}

#[derive(Debug, Args)]
struct InferArgs {
    #[command(flatten)]
    facts: FactArgs,
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    #[command(flatten)]
    facts: FactArgs,
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long)]
    amount: Option<f64>,
}

#[derive(Debug, Args)]
struct RiskArgs {
    #[arg(long = "aggravator", value_enum)]
    aggravators: Vec<AggravatorArg>,
    #[arg(long = "mitigator", value_enum)]
    mitigators: Vec<MitigatorArg>,
    #[arg(long, default_value_t = false)]
    prior_conviction: bool,
    #[arg(long, value_enum, default_value = "unknown")]
    evidence: EvidenceArg,
    #[arg(long)]
    victim_complaint: Option<bool>,
}

#[derive(Debug, Args)]
struct AssessArgs {
    #[arg(long)]
    offence_class: String,
    #[arg(long)]
    amount: Option<f64>,
    #[command(flatten)]
    risk: RiskArgs,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[arg(long = "query-text", default_value = "")]
    query_text: String,
    /// Comma-separated dense embedding, e.g. `1,0,0,0,0,0,0,0`.
    #[arg(long)]
    dense: Option<String>,
    /// Comma-separated `index:weight` pairs, e.g. `0:1.0,1:0.8`.
    #[arg(long)]
    sparse: Option<String>,
}

#[derive(Debug, Subcommand)]
enum SearchCommand {
    Sections(SearchArgs),
    Cases(SearchArgs),
    /// Sections and cases ranked together.
    All(SearchArgs),
}

#[derive(Debug, Subcommand)]
enum CasesCommand {
    /// Precedent cases matching one structured filter.
    Find(CaseFindArgs),
    /// Precedent sentencing patterns and appeal statistics.
    Stats,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("filter").required(true).args(["ordinance", "outcome", "keyword"])
))]
struct CaseFindArgs {
    /// Chapter number cited by a charge, e.g. `210`.
    #[arg(long)]
    ordinance: Option<String>,
    #[arg(long, requires = "ordinance")]
    section: Option<String>,
    /// Exact outcome, case-insensitive.
    #[arg(long)]
    outcome: Option<String>,
    /// Substring of the facts, name, or keywords.
    #[arg(long)]
    keyword: Option<String>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[command(flatten)]
    query: QueryArgs,
    #[arg(long)]
    top_k: Option<usize>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// JSON analysis request; flags below are ignored when given.
    #[arg(long)]
    request: Option<PathBuf>,
    #[command(flatten)]
    facts: FactArgs,
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long)]
    amount: Option<f64>,
    #[arg(long)]
    location_type: Option<String>,
    #[command(flatten)]
    query: QueryArgs,
    #[command(flatten)]
    risk: RiskArgs,
    #[arg(long)]
    top_k_sections: Option<usize>,
    #[arg(long)]
    top_k_cases: Option<usize>,
    /// RFC3339 UTC timestamp; fixes `generated_at` and the package id.
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AggravatorArg {
    Weapon,
    Violence,
    Planning,
    VulnerableVictim,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MitigatorArg {
    GuiltyPlea,
    Remorse,
    FirstOffence,
    Restitution,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EvidenceArg {
    Strong,
    Moderate,
    Weak,
    Unknown,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            object.insert(
                "api_contract_version".to_string(),
                Value::String(API_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "api_contract_version": API_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    if let Command::Config { command: ConfigCommand::Show } = cli.command {
        return run_config_show(cli.config.as_deref(), cli.corpus.as_deref());
    }

    let api = LegalKernelApi::from_config_path(cli.config.as_deref(), cli.corpus.as_deref())?;
    match cli.command {
        Command::Config { .. } => emit_json(serde_json::json!({
            "valid": true,
            "knowledge": api.summary()
        })),
        Command::Rules { command: RulesCommand::List(args) } => run_rules_list(&api, &args),
        Command::Infer(args) => {
            let response = api.infer(&InferRequest { facts: args.facts.facts })?;
            emit_json(serde_json::to_value(&response).context("failed to serialize inference")?)
        }
        Command::Classify(args) => {
            let response = api.classify(&ClassifyRequest {
                facts: args.facts.facts,
                text: args.text,
                amount: args.amount,
            })?;
            emit_json(
                serde_json::to_value(&response).context("failed to serialize classification")?,
            )
        }
        Command::Assess(args) => run_assess(&api, args),
        Command::Search { command } => run_search(&api, command),
        Command::Cases { command: CasesCommand::Find(args) } => {
            let response = api.find_cases(&args.into_filter()?)?;
            emit_json(serde_json::json!({
                "filter": response.filter,
                "case_count": response.cases.len(),
                "cases": response.cases
            }))
        }
        Command::Cases { command: CasesCommand::Stats } => emit_json(
            serde_json::to_value(api.case_statistics())
                .context("failed to serialize case statistics")?,
        ),
        Command::Analyze(args) => run_analyze(&api, *args),
    }
}

fn run_config_show(config_path: Option<&Path>, corpus_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path, corpus_path)?;
    emit_json(serde_json::json!({ "config": config }))
}

fn run_rules_list(api: &LegalKernelApi, args: &RulesListArgs) -> Result<()> {
    let area = args
        .area
        .as_deref()
        .map(|raw| {
            LegalArea::parse(raw.trim()).ok_or_else(|| anyhow!("unknown legal area: {raw}"))
        })
        .transpose()?;
    let listing = api.list_rules(area);
    emit_json(serde_json::json!({
        "area": area,
        "rule_count": listing.rules.len(),
        "defense_count": listing.defenses.len(),
        "rules": listing.rules,
        "defenses": listing.defenses
    }))
}

fn run_assess(api: &LegalKernelApi, args: AssessArgs) -> Result<()> {
    let offence_class = OffenceClass::parse(args.offence_class.trim())
        .ok_or_else(|| anyhow!("unknown offence class: {}", args.offence_class))?;
    let profile = api.assess(&AssessRequest {
        offence_class,
        context: args.risk.into_context(args.amount),
    })?;
    emit_json(serde_json::to_value(&profile).context("failed to serialize risk profile")?)
}

fn run_search(api: &LegalKernelApi, command: SearchCommand) -> Result<()> {
    let (scope, results) = match command {
        SearchCommand::Sections(args) => ("sections", api.search_sections(&args.into_request()?)?),
        SearchCommand::Cases(args) => ("cases", api.search_cases(&args.into_request()?)?),
        SearchCommand::All(args) => ("all", api.search_all(&args.into_request()?)?),
    };
    emit_json(serde_json::json!({
        "scope": scope,
        "results": results
    }))
}

fn run_analyze(api: &LegalKernelApi, args: AnalyzeArgs) -> Result<()> {
    let as_of = args.as_of.as_deref().map(parse_rfc3339).transpose()?;
    let mut request = match args.request.as_ref() {
        Some(path) => read_analyze_request(path)?,
        None => AnalyzeRequest {
            facts: args.facts.facts,
            text: args.text,
            amount: args.amount,
            location_type: args.location_type,
            query: args.query.into_optional_query()?,
            risk: args.risk.into_context(None),
            top_k_sections: args.top_k_sections,
            top_k_cases: args.top_k_cases,
            as_of: None,
        },
    };
    if as_of.is_some() {
        request.as_of = as_of;
    }

    let package = api.analyze(request)?;
    emit_json(serde_json::to_value(&package).context("failed to serialize analysis package")?)
}

fn read_analyze_request(path: &Path) -> Result<AnalyzeRequest> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("invalid analysis request {}", path.display()))
}

impl SearchArgs {
    fn into_request(self) -> Result<SearchRequest> {
        Ok(SearchRequest { query: self.query.into_query()?, top_k: self.top_k })
    }
}

impl CaseFindArgs {
    fn into_filter(self) -> Result<CaseFilter> {
        match (self.ordinance, self.outcome, self.keyword) {
            (Some(ordinance_id), None, None) => {
                Ok(CaseFilter::Ordinance { ordinance_id, section_id: self.section })
            }
            (None, Some(outcome), None) => Ok(CaseFilter::Outcome { outcome }),
            (None, None, Some(keyword)) => Ok(CaseFilter::Keyword { keyword }),
            _ => Err(anyhow!("exactly one of --ordinance, --outcome, --keyword is required")),
        }
    }
}

impl QueryArgs {
    fn into_optional_query(self) -> Result<Option<SearchQuery>> {
        if self.dense.is_none() && self.sparse.is_none() {
            return Ok(None);
        }
        self.into_query().map(Some)
    }

    fn into_query(self) -> Result<SearchQuery> {
        let dense = self
            .dense
            .as_deref()
            .ok_or_else(|| anyhow!("--dense is required for a search query"))
            .and_then(parse_dense)?;
        let sparse = match self.sparse.as_deref() {
            Some(raw) => parse_sparse(raw)?,
            None => SparseVector::default(),
        };
        Ok(SearchQuery { text: self.query_text, dense, sparse })
    }
}

impl RiskArgs {
    fn into_context(self, amount: Option<f64>) -> RiskContext {
        RiskContext {
            amount,
            aggravators: self.aggravators.into_iter().map(AggravatorArg::into_aggravator).collect(),
            mitigators: self.mitigators.into_iter().map(MitigatorArg::into_mitigator).collect(),
            prior_conviction: self.prior_conviction,
            evidence_strength: self.evidence.into_evidence_strength(),
            victim_complaint: self.victim_complaint,
        }
    }
}

fn parse_dense(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>().with_context(|| format!("invalid dense component: {part}"))
        })
        .collect()
}

fn parse_sparse(raw: &str) -> Result<SparseVector> {
    let entries = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (index, weight) = part
                .split_once(':')
                .ok_or_else(|| anyhow!("sparse entry MUST be index:weight (received: {part})"))?;
            let index = index
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid sparse index: {index}"))?;
            let weight = weight
                .trim()
                .parse::<f32>()
                .with_context(|| format!("invalid sparse weight: {weight}"))?;
            Ok((index, weight))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SparseVector::new(entries))
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 UTC timestamp: {value}"))?;

    if parsed.offset() != time::UtcOffset::UTC {
        return Err(anyhow!("timestamp MUST use UTC offset Z (received: {value})"));
    }

    Ok(parsed)
}

impl AggravatorArg {
    fn into_aggravator(self) -> Aggravator {
        match self {
            Self::Weapon => Aggravator::Weapon,
            Self::Violence => Aggravator::Violence,
            Self::Planning => Aggravator::Planning,
            Self::VulnerableVictim => Aggravator::VulnerableVictim,
        }
    }
}

impl MitigatorArg {
    fn into_mitigator(self) -> Mitigator {
        match self {
            Self::GuiltyPlea => Mitigator::GuiltyPlea,
            Self::Remorse => Mitigator::Remorse,
            Self::FirstOffence => Mitigator::FirstOffence,
            Self::Restitution => Mitigator::Restitution,
        }
    }
}

impl EvidenceArg {
    fn into_evidence_strength(self) -> EvidenceStrength {
        match self {
            Self::Strong => EvidenceStrength::Strong,
            Self::Moderate => EvidenceStrength::Moderate,
            Self::Weak => EvidenceStrength::Weak,
            Self::Unknown => EvidenceStrength::Unknown,
        }
    }
}
