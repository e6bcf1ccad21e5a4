//! SQL parsing behind a narrow seam.
//!
//! The validator never inspects a parser's AST directly. A [`SqlParser`]
//! reduces each statement to a [`StatementOutline`] carrying only what the
//! safety rules look at, and renders a statement back to SQL with a row cap
//! attached. [`AstSqlParser`] implements both on top of `sqlparser`.

use crate::models::DatabaseType;
use sqlparser::ast::{
    Expr, ObjectName, Query, SetExpr, Statement, TableFactor, Value, Visit, Visitor,
};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use std::ops::ControlFlow;

/// Parser failure carrying the backend's message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseFailure {
    pub message: String,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ParserError> for ParseFailure {
    fn from(error: ParserError) -> Self {
        Self::new(error.to_string())
    }
}

/// What kind of statement sits at the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatementKind {
    /// A plain `SELECT` (optionally with CTEs, ORDER BY, LIMIT)
    #[default]
    Select,
    /// Anything else, labelled with its leading keyword (`INSERT`, `UNION`, ...)
    Other(String),
    /// Trailing text after a statement delimiter that did not parse
    Unparsed,
}

/// A relation referenced by a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    /// `schema.name` when qualified, `name` otherwise
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    fn from_object_name(name: &ObjectName) -> Option<Self> {
        let mut parts = name.0.iter().rev().map(|ident| ident.value.clone());
        let table = parts.next()?;
        Some(Self {
            schema: parts.next(),
            name: table,
        })
    }
}

/// The safety-relevant shape of one parsed statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatementOutline {
    pub kind: StatementKind,
    /// Every function invoked anywhere in the statement, by bare name
    pub functions: Vec<String>,
    /// Every relation read, CTE names excluded
    pub tables: Vec<TableRef>,
    /// Constructs that are never allowed even inside a SELECT
    /// (nested data-modifying statements, `SELECT INTO`, row locking)
    pub disallowed: Vec<String>,
    /// Whether the outermost query already carries LIMIT or FETCH
    pub has_limit: bool,
}

impl StatementOutline {
    pub fn select() -> Self {
        Self::default()
    }

    pub fn other(label: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Other(label.into()),
            ..Self::default()
        }
    }

    pub fn unparsed() -> Self {
        Self {
            kind: StatementKind::Unparsed,
            ..Self::default()
        }
    }

    pub fn is_select(&self) -> bool {
        self.kind == StatementKind::Select
    }
}

/// Dialect-aware SQL parser used by the safety validator.
pub trait SqlParser: Send + Sync {
    /// Splits `sql` into statements and outlines each one.
    ///
    /// # Errors
    /// Returns [`ParseFailure`] when the first statement does not parse.
    /// Text after a delimiter that does not parse is reported as an
    /// [`StatementKind::Unparsed`] outline instead, so the caller still
    /// sees more than one statement.
    fn parse(
        &self,
        sql: &str,
        dialect: DatabaseType,
    ) -> std::result::Result<Vec<StatementOutline>, ParseFailure>;

    /// Re-renders a single SELECT with `LIMIT limit` attached to the
    /// outermost query. Statements that already carry a row cap are
    /// rendered unchanged.
    fn render_with_limit(
        &self,
        sql: &str,
        dialect: DatabaseType,
        limit: u64,
    ) -> std::result::Result<String, ParseFailure>;
}

/// [`SqlParser`] backed by the `sqlparser` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstSqlParser;

fn grammar_for(dialect: DatabaseType) -> Box<dyn Dialect> {
    match dialect {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
    }
}

impl SqlParser for AstSqlParser {
    fn parse(
        &self,
        sql: &str,
        dialect: DatabaseType,
    ) -> std::result::Result<Vec<StatementOutline>, ParseFailure> {
        let grammar = grammar_for(dialect);
        let mut parser = Parser::new(grammar.as_ref()).try_with_sql(sql)?;
        let mut outlines = Vec::new();
        let mut expecting_delimiter = false;

        loop {
            while parser.consume_token(&Token::SemiColon) {
                expecting_delimiter = false;
            }
            if parser.peek_token().token == Token::EOF {
                break;
            }
            if expecting_delimiter {
                return Err(ParseFailure::new(format!(
                    "Expected end of statement, found: {}",
                    parser.peek_token().token
                )));
            }

            match parser.parse_statement() {
                Ok(statement) => outlines.push(outline(&statement)),
                Err(_) if !outlines.is_empty() => {
                    outlines.push(StatementOutline::unparsed());
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            expecting_delimiter = true;
        }

        Ok(outlines)
    }

    fn render_with_limit(
        &self,
        sql: &str,
        dialect: DatabaseType,
        limit: u64,
    ) -> std::result::Result<String, ParseFailure> {
        let grammar = grammar_for(dialect);
        let mut statements = Parser::parse_sql(grammar.as_ref(), sql)?;

        let [Statement::Query(query)] = statements.as_mut_slice() else {
            return Err(ParseFailure::new("Expected exactly one query"));
        };

        if query.limit.is_none() && query.fetch.is_none() {
            query.limit = Some(Expr::Value(Value::Number(limit.to_string(), false)));
        }

        Ok(query.to_string())
    }
}

/// Builds the outline for one parsed statement.
fn outline(statement: &Statement) -> StatementOutline {
    let (kind, has_limit) = match statement {
        Statement::Query(query) => {
            let kind = match query.body.as_ref() {
                SetExpr::Select(_) => StatementKind::Select,
                SetExpr::SetOperation { op, .. } => StatementKind::Other(op.to_string()),
                SetExpr::Query(_) => StatementKind::Other("SUBQUERY".to_string()),
                other => StatementKind::Other(leading_keyword(&other.to_string())),
            };
            (kind, query.limit.is_some() || query.fetch.is_some())
        }
        other => (
            StatementKind::Other(leading_keyword(&other.to_string())),
            false,
        ),
    };

    let mut collector = OutlineCollector::default();
    let _ = statement.visit(&mut collector);

    let OutlineCollector {
        functions,
        tables,
        disallowed,
        ..
    } = collector;

    StatementOutline {
        kind,
        functions,
        tables,
        disallowed,
        has_limit,
    }
}

fn leading_keyword(rendered: &str) -> String {
    rendered
        .split_whitespace()
        .next()
        .map(|word| word.trim_start_matches('(').to_uppercase())
        .filter(|word| !word.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn last_ident(name: &ObjectName) -> Option<String> {
    name.0.last().map(|ident| ident.value.clone())
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}

/// CTE names introduced by one query's `WITH` clause.
///
/// A name is in scope for the query body and for the bodies of the CTEs
/// that follow it. Under `WITH RECURSIVE` every CTE body sees every name.
struct CteScope {
    query: *const Query,
    names: Vec<String>,
    bodies: Vec<*const Query>,
    recursive: bool,
    /// How many of `names` are visible at the current traversal point
    visible: usize,
}

impl CteScope {
    fn enter(query: &Query) -> Self {
        let (names, bodies, recursive) = match &query.with {
            Some(with) => (
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase())
                    .collect(),
                with.cte_tables
                    .iter()
                    .map(|cte| std::ptr::from_ref::<Query>(&*cte.query))
                    .collect(),
                with.recursive,
            ),
            None => (Vec::new(), Vec::new(), false),
        };
        let visible = if recursive { names.len() } else { 0 };
        Self {
            query: std::ptr::from_ref(query),
            names,
            bodies,
            recursive,
            visible,
        }
    }

    fn body_index(&self, query: &Query) -> Option<usize> {
        self.bodies
            .iter()
            .position(|body| std::ptr::eq(*body, query))
    }

    fn defines(&self, name: &str) -> bool {
        self.names.iter().take(self.visible).any(|cte| cte == name)
    }
}

#[derive(Default)]
struct OutlineCollector {
    functions: Vec<String>,
    tables: Vec<TableRef>,
    disallowed: Vec<String>,
    scopes: Vec<CteScope>,
    statement_depth: usize,
    /// Relation name of a table-valued function whose factor is being visited
    function_relation: Option<ObjectName>,
}

impl OutlineCollector {
    fn is_cte_reference(&self, table: &TableRef) -> bool {
        if table.schema.is_some() {
            return false;
        }
        let name = table.name.to_lowercase();
        self.scopes.iter().any(|scope| scope.defines(&name))
    }
}

impl Visitor for OutlineCollector {
    type Break = ();

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        self.statement_depth = self.statement_depth.saturating_add(1);
        if self.statement_depth > 1 && !matches!(statement, Statement::Query(_)) {
            self.disallowed
                .push(leading_keyword(&statement.to_string()));
        }
        ControlFlow::Continue(())
    }

    fn post_visit_statement(&mut self, _statement: &Statement) -> ControlFlow<Self::Break> {
        self.statement_depth = self.statement_depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        // Entering a CTE body: only the CTEs before it are in scope
        if let Some(scope) = self.scopes.last_mut()
            && !scope.recursive
            && let Some(index) = scope.body_index(query)
        {
            scope.visible = index;
        }
        self.scopes.push(CteScope::enter(query));

        if selects_into(&query.body) {
            self.disallowed.push("SELECT INTO".to_string());
        }
        if !query.locks.is_empty() {
            self.disallowed.push("row locking clause".to_string());
        }
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if self
            .scopes
            .last()
            .is_some_and(|scope| std::ptr::eq(scope.query, query))
        {
            self.scopes.pop();
        }
        // Leaving a CTE body: it is now visible to later siblings and the body
        if let Some(scope) = self.scopes.last_mut()
            && !scope.recursive
            && let Some(index) = scope.body_index(query)
        {
            scope.visible = index.saturating_add(1);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match factor {
            TableFactor::Table {
                name,
                args: Some(_),
                ..
            } => {
                self.functions.extend(last_ident(name));
                self.function_relation = Some(name.clone());
            }
            TableFactor::Function { name, .. } => {
                self.functions.extend(last_ident(name));
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if self.function_relation.as_ref() == Some(relation) {
            self.function_relation = None;
        } else if let Some(table) = TableRef::from_object_name(relation)
            && !self.is_cte_reference(&table)
        {
            self.tables.push(table);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Expr::Function(function) = expr {
            self.functions.extend(last_ident(&function.name));
        }
        ControlFlow::Continue(())
    }
}
