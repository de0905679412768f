use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::retrieval::base::{MetadataFilter, RetrieveOptions, Retriever, SearchResults};

pub const SEARCH_ALL_DOCUMENTS: &str = "searchAllDocuments";
pub const SEARCH_BY_COMPONENT_TYPE: &str = "searchByComponentType";
pub const SEARCH_BY_MANUFACTURER: &str = "searchByManufacturer";
pub const SEARCH_BY_SPECIFICATIONS: &str = "searchBySpecifications";
pub const SEARCH_BY_PART_NUMBER: &str = "searchByPartNumber";
pub const ASK_FOR_CONFIRMATION: &str = "askForConfirmation";

/// Metadata key paths the pipeline exposes for structured filtering.
const COMPONENT_TYPE_KEY: &str = "document_metadata.component_type";
const PART_NUMBER_KEY: &str = "document_metadata.part_number";

fn default_num_results() -> u32 {
    20
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    OpAmp,
    Comparator,
    Adc,
    Microcontroller,
    CurrentSenseAmplifier,
    Rs485Transceiver,
    Other,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::OpAmp => "op_amp",
            ComponentType::Comparator => "comparator",
            ComponentType::Adc => "adc",
            ComponentType::Microcontroller => "microcontroller",
            ComponentType::CurrentSenseAmplifier => "current_sense_amplifier",
            ComponentType::Rs485Transceiver => "rs485_transceiver",
            ComponentType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    RailToRail,
    OpenDrain,
    PushPull,
    Unknown,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::RailToRail => "rail_to_rail",
            OutputType::OpenDrain => "open_drain",
            OutputType::PushPull => "push_pull",
            OutputType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllDocumentsArgs {
    pub query: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTypeArgs {
    pub query: String,
    pub component_type: ComponentType,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManufacturerArgs {
    pub query: String,
    pub manufacturer: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationFilters {
    pub min_supply_voltage: Option<f64>,
    pub max_supply_voltage: Option<f64>,
    pub min_bandwidth: Option<f64>,
    pub max_quiescent_current: Option<f64>,
    pub min_slew_rate: Option<f64>,
    pub temperature_protection: Option<bool>,
    pub output_type: Option<OutputType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationsArgs {
    pub query: String,
    pub component_type: Option<ComponentType>,
    pub specifications: Option<SpecificationFilters>,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartNumberArgs {
    pub part_number: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

/// One variant per search tool; parsing doubles as argument validation, so
/// invalid input is rejected before anything reaches the backend.
#[derive(Debug, Clone)]
pub enum SearchRequest {
    AllDocuments(AllDocumentsArgs),
    ByComponentType(ComponentTypeArgs),
    ByManufacturer(ManufacturerArgs),
    BySpecifications(SpecificationsArgs),
    ByPartNumber(PartNumberArgs),
}

impl SearchRequest {
    pub fn parse(name: &str, arguments: &Value) -> AgentResult<Self> {
        let invalid =
            |e: serde_json::Error| AgentError::InvalidParameters(format!("{}: {}", name, e));
        match name {
            SEARCH_ALL_DOCUMENTS => serde_json::from_value(arguments.clone())
                .map(SearchRequest::AllDocuments)
                .map_err(invalid),
            SEARCH_BY_COMPONENT_TYPE => serde_json::from_value(arguments.clone())
                .map(SearchRequest::ByComponentType)
                .map_err(invalid),
            SEARCH_BY_MANUFACTURER => serde_json::from_value(arguments.clone())
                .map(SearchRequest::ByManufacturer)
                .map_err(invalid),
            SEARCH_BY_SPECIFICATIONS => serde_json::from_value(arguments.clone())
                .map(SearchRequest::BySpecifications)
                .map_err(invalid),
            SEARCH_BY_PART_NUMBER => serde_json::from_value(arguments.clone())
                .map(SearchRequest::ByPartNumber)
                .map_err(invalid),
            _ => Err(AgentError::ToolNotFound(name.to_string())),
        }
    }
}

/// Renders each present specification into a natural-language clause for the
/// semantic query. The backend has no structured fields for these.
fn specification_clauses(spec: &SpecificationFilters) -> Vec<String> {
    let mut clauses = Vec::new();
    if let Some(volts) = spec.min_supply_voltage {
        clauses.push(format!("supply voltage above {}V", volts));
    }
    if let Some(volts) = spec.max_supply_voltage {
        clauses.push(format!("supply voltage below {}V", volts));
    }
    if let Some(mhz) = spec.min_bandwidth {
        clauses.push(format!("bandwidth above {}MHz", mhz));
    }
    if let Some(current) = spec.max_quiescent_current {
        clauses.push(format!("low power consumption below {}µA", current));
    }
    if let Some(rate) = spec.min_slew_rate {
        clauses.push(format!("slew rate above {}V/µs", rate));
    }
    if spec.temperature_protection.unwrap_or(false) {
        clauses.push("thermal protection".to_string());
    }
    if let Some(output) = spec.output_type {
        clauses.push(format!("{} output", output.as_str()));
    }
    clauses
}

/// The uniform failure payload a tool hands back to the model so the
/// conversation can continue instead of the exchange aborting.
pub fn error_result<S: Into<String>>(message: S) -> Value {
    json!({ "error": true, "message": message.into(), "documents": [] })
}

/// The component search tool catalogue: declarations the model sees plus the
/// executors that run against the retrieval pipeline.
pub struct SearchTools {
    tools: Vec<Tool>,
    retriever: Arc<dyn Retriever>,
}

impl SearchTools {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        let num_results_schema = json!({
            "type": "number",
            "description": "How many results you want (default: 20)"
        });
        let component_type_values = [
            "op_amp",
            "comparator",
            "adc",
            "microcontroller",
            "current_sense_amplifier",
            "rs485_transceiver",
            "other",
        ];

        let tools = vec![
            Tool::new(
                SEARCH_ALL_DOCUMENTS,
                "Search across all technical documents to find relevant information about electronic components",
                json!({
                    "type": "object",
                    "required": ["query"],
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What you want to search for"
                        },
                        "numResults": num_results_schema.clone()
                    }
                }),
            ),
            Tool::new(
                SEARCH_BY_COMPONENT_TYPE,
                "Find information about a specific type of electronic component",
                json!({
                    "type": "object",
                    "required": ["query", "componentType"],
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What you want to know about this component"
                        },
                        "componentType": {
                            "enum": component_type_values,
                            "description": "The type of component you are interested in"
                        },
                        "numResults": num_results_schema.clone()
                    }
                }),
            ),
            Tool::new(
                SEARCH_BY_MANUFACTURER,
                "Find technical documents from a specific manufacturer",
                json!({
                    "type": "object",
                    "required": ["query", "manufacturer"],
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What you want to search for"
                        },
                        "manufacturer": {
                            "type": "string",
                            "description": "Name of the manufacturer (e.g., \"3PEAK\", \"Texas Instruments\", \"Analog Devices\")"
                        },
                        "numResults": num_results_schema.clone()
                    }
                }),
            ),
            Tool::new(
                SEARCH_BY_SPECIFICATIONS,
                "Find components based on technical specifications like voltage, current, frequency, temperature range, etc. Can also filter by component type.",
                json!({
                    "type": "object",
                    "required": ["query"],
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What you want to search for"
                        },
                        "componentType": {
                            "enum": component_type_values,
                            "description": "Optional: filter by component type first"
                        },
                        "specifications": {
                            "type": "object",
                            "description": "Technical specifications to filter by",
                            "properties": {
                                "minSupplyVoltage": {"type": "number", "description": "Minimum supply voltage in volts"},
                                "maxSupplyVoltage": {"type": "number", "description": "Maximum supply voltage in volts"},
                                "minBandwidth": {"type": "number", "description": "Minimum bandwidth in MHz"},
                                "maxQuiescentCurrent": {"type": "number", "description": "Maximum quiescent current in microamperes"},
                                "minSlewRate": {"type": "number", "description": "Minimum slew rate in V/µs"},
                                "temperatureProtection": {"type": "boolean", "description": "Requires thermal protection"},
                                "outputType": {"enum": ["rail_to_rail", "open_drain", "push_pull", "unknown"], "description": "Required output type"}
                            }
                        },
                        "numResults": num_results_schema.clone()
                    }
                }),
            ),
            Tool::new(
                SEARCH_BY_PART_NUMBER,
                "Find information about a specific part number",
                json!({
                    "type": "object",
                    "required": ["partNumber"],
                    "properties": {
                        "partNumber": {
                            "type": "string",
                            "description": "The part number to search for (e.g., \"TP1281\", \"LM358\")"
                        },
                        "numResults": num_results_schema
                    }
                }),
            ),
            Tool::new(
                ASK_FOR_CONFIRMATION,
                "Ask the user for confirmation",
                json!({
                    "type": "object",
                    "required": ["message"],
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "The message to ask for confirmation"
                        }
                    }
                }),
            ),
        ];

        Self { tools, retriever }
    }

    /// All declared tools, including the executor-less confirmation tool.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Whether the named tool runs on the server. `askForConfirmation` is
    /// declared to the model but its result is supplied by the chat client.
    pub fn has_executor(name: &str) -> bool {
        name != ASK_FOR_CONFIRMATION
    }

    pub async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        if tool_call.name == ASK_FOR_CONFIRMATION {
            return Err(AgentError::ExecutionError(
                "askForConfirmation has no executor; the client supplies its result".to_string(),
            ));
        }

        let request = SearchRequest::parse(&tool_call.name, &tool_call.arguments)?;
        Ok(self.execute(request).await)
    }

    /// Runs a validated search. Backend failures come back as the uniform
    /// error result rather than an error.
    async fn execute(&self, request: SearchRequest) -> Value {
        let outcome = match request {
            SearchRequest::AllDocuments(args) => {
                self.retriever
                    .retrieve(
                        &args.query,
                        RetrieveOptions {
                            num_results: args.num_results,
                            metadata_filters: Vec::new(),
                        },
                    )
                    .await
            }
            SearchRequest::ByComponentType(args) => {
                self.retriever
                    .retrieve(
                        &args.query,
                        RetrieveOptions {
                            num_results: args.num_results,
                            metadata_filters: vec![MetadataFilter::new(
                                COMPONENT_TYPE_KEY,
                                vec![args.component_type.as_str().to_string()],
                            )],
                        },
                    )
                    .await
            }
            SearchRequest::ByManufacturer(args) => {
                // No structured manufacturer field exists in the backend
                // metadata; fold the name into the semantic query instead.
                let enhanced = format!("{} {}", args.manufacturer, args.query);
                self.retriever
                    .retrieve(
                        &enhanced,
                        RetrieveOptions {
                            num_results: args.num_results,
                            metadata_filters: Vec::new(),
                        },
                    )
                    .await
            }
            SearchRequest::BySpecifications(args) => {
                let mut metadata_filters = Vec::new();
                if let Some(component_type) = args.component_type {
                    metadata_filters.push(MetadataFilter::new(
                        COMPONENT_TYPE_KEY,
                        vec![component_type.as_str().to_string()],
                    ));
                }

                let mut query = args.query.clone();
                if let Some(spec) = &args.specifications {
                    let clauses = specification_clauses(spec);
                    if !clauses.is_empty() {
                        query = format!("{} {}", query, clauses.join(" "));
                    }
                }

                self.retriever
                    .retrieve(
                        &query,
                        RetrieveOptions {
                            num_results: args.num_results,
                            metadata_filters,
                        },
                    )
                    .await
            }
            SearchRequest::ByPartNumber(args) => self.search_by_part_number(&args).await,
        };

        match outcome {
            Ok(results) => json!({ "documents": results.documents }),
            Err(e) => {
                tracing::warn!("search tool failed: {}", e);
                error_result(e.to_string())
            }
        }
    }

    async fn search_by_part_number(&self, args: &PartNumberArgs) -> anyhow::Result<SearchResults> {
        let exact = self
            .retriever
            .retrieve(
                &args.part_number,
                RetrieveOptions {
                    num_results: args.num_results,
                    metadata_filters: vec![MetadataFilter::new(
                        PART_NUMBER_KEY,
                        vec![args.part_number.clone()],
                    )],
                },
            )
            .await?;

        if !exact.documents.is_empty() {
            return Ok(exact);
        }

        // No exact match: one fallback semantic query, never retried further.
        let fallback = format!("part number {}", args.part_number);
        self.retriever
            .retrieve(
                &fallback,
                RetrieveOptions {
                    num_results: args.num_results,
                    metadata_filters: Vec::new(),
                },
            )
            .await
    }
}
