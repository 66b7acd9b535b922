use thiserror::Error;

use crate::commands::MutationRequest;
use crate::history::HistorySchema;
use crate::serializer::GraphView;

/// Separator between tokens of a request string.
pub const TOKEN_SEPARATOR: char = ',';

/// A parsed request string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Graph(GraphView),
    /// `None` uses the dispatcher's configured schema.
    History(Option<HistorySchema>),
    Refresh,
    Mutation(MutationRequest),
    Highlight {
        lpq: String,
    },
    OpenPath {
        path: String,
        position: Option<(u32, u32)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty request")]
    Empty,

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command} requires a {argument} argument")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{0}' is not a valid line or column number")]
    InvalidNumber(String),

    #[error("'{0}' is not a known history schema")]
    UnknownSchema(String),
}

impl Request {
    /// Parse `command,arg1,arg2,...`. Arguments are taken verbatim, so
    /// surrounding whitespace stays part of the value.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let tokens: Vec<&str> = raw.split(TOKEN_SEPARATOR).collect();
        let args = Args {
            command: tokens[0],
            rest: &tokens[1..],
        };

        let request = match args.command {
            "tree" | "treeMap" => Self::Graph(GraphView::Tree),
            "tangling" | "tanglingGraph" => Self::Graph(GraphView::Tangling),
            "featureHistory" => match args.optional(0) {
                None => Self::History(None),
                Some(schema) => Self::History(Some(
                    HistorySchema::from_str(schema)
                        .ok_or_else(|| ParseError::UnknownSchema(schema.to_string()))?,
                )),
            },
            "refresh" => Self::Refresh,
            "addFeature" => Self::Mutation(MutationRequest::AddChild {
                parent: args.required(0, "addFeature", "parent")?,
                name: args.required(1, "addFeature", "name")?,
            }),
            "deleteFeature" => Self::Mutation(MutationRequest::DeleteAnnotationsOnly {
                target: args.required(0, "deleteFeature", "target")?,
            }),
            "dropFeature" => Self::Mutation(MutationRequest::DeleteSubtree {
                target: args.required(0, "dropFeature", "target")?,
            }),
            "moveFeature" => Self::Mutation(MutationRequest::Move {
                child: args.required(0, "moveFeature", "child")?,
                new_parent: args.required(1, "moveFeature", "new parent")?,
            }),
            "renameFeature" => Self::Mutation(MutationRequest::Rename {
                target: args.required(0, "renameFeature", "target")?,
                name: args.required(1, "renameFeature", "name")?,
            }),
            "highlightFeature" => Self::Highlight {
                lpq: args.required(0, "highlightFeature", "feature")?,
            },
            "openPath" => {
                let path = args.required(0, "openPath", "path")?;
                let position = match (args.optional(1), args.optional(2)) {
                    (None, _) => None,
                    (Some(line), None) => Some((parse_number(line)?, 0)),
                    (Some(line), Some(column)) => {
                        Some((parse_number(line)?, parse_number(column)?))
                    }
                };
                Self::OpenPath { path, position }
            }
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(request)
    }
}

struct Args<'a> {
    command: &'a str,
    rest: &'a [&'a str],
}

impl Args<'_> {
    fn optional(&self, index: usize) -> Option<&str> {
        self.rest.get(index).copied()
    }

    fn required(
        &self,
        index: usize,
        command: &'static str,
        argument: &'static str,
    ) -> Result<String, ParseError> {
        self.optional(index)
            .map(str::to_string)
            .ok_or(ParseError::MissingArgument { command, argument })
    }
}

fn parse_number(token: &str) -> Result<u32, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::InvalidNumber(token.to_string()))
}
