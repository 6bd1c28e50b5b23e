//! Google Tasks: task lists, and the to-do tasks they hold
//!
//! Both are exchanged as JSON. Task lists live at `users/@me/lists`, tasks under their list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::authorization::{AuthorizationDomain, Authorizer};
use crate::cancel::Cancellable;
use crate::config::ServiceConfig;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, ErrorKind, ParseError, Result};
use crate::feed::{Feed, ProgressCallback};
use crate::parsable::ContentType;
use crate::parser::{self, JsonMember, ParserOptions};
use crate::query::{PaginationType, Query};
use crate::service::{errors, OperationType, Service, ServiceClass};
use crate::transport::Transport;

pub const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/tasks";

const TASKLISTS_URI: &str = "https://www.googleapis.com/tasks/v1/users/@me/lists";
const LISTS_URI: &str = "https://www.googleapis.com/tasks/v1/lists";

/// The status of a task that is still to be done
pub const STATUS_NEEDS_ACTION: &str = "needsAction";
/// The status of a completed task
pub const STATUS_COMPLETED: &str = "completed";

/// The only authorization domain of the Tasks service
pub fn tasks_domain() -> Arc<AuthorizationDomain> {
    AuthorizationDomain::get("tasks", TASKS_SCOPE)
}


/// A list of tasks. It has no field of its own: its title and ID are the entry's.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskList;

impl EntryKind for TaskList {
    fn kind_term() -> Option<&'static str> {
        Some("tasks#taskList")
    }

    fn content_type() -> ContentType {
        ContentType::Json
    }

    fn get_entry_uri(id: &str) -> String {
        format!("{}/{}", TASKLISTS_URI, id)
    }
}

/// A to-do task
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Task {
    parent: Option<String>,
    position: Option<String>,
    notes: Option<String>,
    status: Option<String>,
    due: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
    deleted: bool,
    hidden: bool,
}

impl Task {
    /// The ID of the parent task, if this is a sub-task
    pub fn parent(&self) -> Option<&str>            { self.parent.as_deref() }
    /// The position among its siblings. Comparing positions as strings gives the task order.
    pub fn position(&self) -> Option<&str>          { self.position.as_deref() }
    pub fn notes(&self) -> Option<&str>             { self.notes.as_deref() }
    /// Either [`STATUS_NEEDS_ACTION`] or [`STATUS_COMPLETED`]
    pub fn status(&self) -> Option<&str>            { self.status.as_deref() }
    pub fn due(&self) -> Option<DateTime<Utc>>      { self.due }
    pub fn completed(&self) -> Option<DateTime<Utc>> { self.completed }
    pub fn is_deleted(&self) -> bool                { self.deleted }
    /// Hidden tasks are the completed ones that were cleared from the list
    pub fn is_hidden(&self) -> bool                 { self.hidden }

    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some(STATUS_COMPLETED)
    }

    pub fn set_parent(&mut self, parent: Option<&str>) {
        self.parent = parent.map(String::from);
    }

    pub fn set_position(&mut self, position: Option<&str>) {
        self.position = position.map(String::from);
    }

    pub fn set_notes(&mut self, notes: Option<&str>) {
        self.notes = notes.map(String::from);
    }

    pub fn set_status(&mut self, status: Option<&str>) {
        self.status = status.map(String::from);
    }

    pub fn set_due(&mut self, due: Option<DateTime<Utc>>) {
        self.due = due;
    }

    pub fn set_completed(&mut self, completed: Option<DateTime<Utc>>) {
        self.completed = completed;
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }
}

impl EntryKind for Task {
    fn kind_term() -> Option<&'static str> {
        Some("tasks#task")
    }

    fn content_type() -> ContentType {
        ContentType::Json
    }

    fn parse_json(&mut self, member: &JsonMember) -> std::result::Result<bool, ParseError> {
        if parser::string_from_json_member(member, "parent", ParserOptions::DEFAULT, &mut self.parent)? ||
           parser::string_from_json_member(member, "position", ParserOptions::DEFAULT, &mut self.position)? ||
           parser::string_from_json_member(member, "notes", ParserOptions::DEFAULT, &mut self.notes)? ||
           parser::string_from_json_member(member, "status", ParserOptions::DEFAULT, &mut self.status)? ||
           parser::time_from_json_member(member, "due", ParserOptions::DEFAULT, &mut self.due)? ||
           parser::time_from_json_member(member, "completed", ParserOptions::DEFAULT, &mut self.completed)? {
            return Ok(true);
        }

        let mut flag = None;
        if parser::boolean_from_json_member(member, "deleted", ParserOptions::DEFAULT, &mut flag)? {
            self.deleted = flag.unwrap_or(false);
            return Ok(true);
        }
        if parser::boolean_from_json_member(member, "hidden", ParserOptions::DEFAULT, &mut flag)? {
            self.hidden = flag.unwrap_or(false);
            return Ok(true);
        }
        Ok(false)
    }

    fn render_json(&self, map: &mut Map<String, Value>) {
        let strings = [
            ("parent", &self.parent),
            ("position", &self.position),
            ("notes", &self.notes),
            ("status", &self.status),
        ];
        for (name, value) in strings.iter() {
            if let Some(value) = value {
                map.insert(name.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(due) = &self.due {
            map.insert("due".into(), Value::String(parser::to_iso8601(due)));
        }
        if let Some(completed) = &self.completed {
            map.insert("completed".into(), Value::String(parser::to_iso8601(completed)));
        }
        map.insert("deleted".into(), Value::Bool(self.deleted));
        map.insert("hidden".into(), Value::Bool(self.hidden));
    }
}


/// Filters for listing tasks. Every option is sent, even when left to its default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TasksQuery {
    /// Page size. Zero lets the server decide.
    pub max_results: u32,
    pub updated_min: Option<DateTime<Utc>>,
    pub completed_min: Option<DateTime<Utc>>,
    pub completed_max: Option<DateTime<Utc>>,
    pub due_min: Option<DateTime<Utc>>,
    pub due_max: Option<DateTime<Utc>>,
    pub show_completed: bool,
    pub show_deleted: bool,
    pub show_hidden: bool,
}

impl TasksQuery {
    /// A query paginated by tokens, carrying these filters
    pub fn to_query(&self) -> Query {
        let mut query = Query::with_pagination(PaginationType::Tokens);
        if self.max_results > 0 {
            query.set_parameter("maxResults", Some(self.max_results.to_string().as_str()));
        }
        let times = [
            ("updatedMin", self.updated_min),
            ("completedMin", self.completed_min),
            ("completedMax", self.completed_max),
            ("dueMin", self.due_min),
            ("dueMax", self.due_max),
        ];
        for (name, time) in times.iter() {
            if let Some(time) = time {
                query.set_parameter(name, Some(parser::to_iso8601(time).as_str()));
            }
        }
        query.set_parameter("showCompleted", Some(bool_parameter(self.show_completed)));
        query.set_parameter("showDeleted", Some(bool_parameter(self.show_deleted)));
        query.set_parameter("showHidden", Some(bool_parameter(self.show_hidden)));
        query
    }
}

fn bool_parameter(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}


/// How the Tasks API differs from the generic service
#[derive(Clone, Copy, Debug, Default)]
pub struct TasksClass;

impl ServiceClass for TasksClass {
    fn api_version(&self) -> Option<&'static str> {
        None
    }

    fn authorization_domains(&self) -> Vec<Arc<AuthorizationDomain>> {
        vec![tasks_domain()]
    }

    fn parse_error_response(&self, operation: OperationType, status: u16, reason_phrase: &str, body: &str) -> Error {
        errors::json_envelope_error(operation, status, reason_phrase, body)
    }
}

/// A client for the Tasks API
#[derive(Clone, Debug)]
pub struct TasksService {
    service: Service,
}

impl TasksService {
    pub fn new(authorizer: Option<Arc<dyn Authorizer>>) -> Result<Self> {
        Ok(Self { service: Service::new(TasksClass, authorizer)? })
    }

    pub fn with_transport(authorizer: Option<Arc<dyn Authorizer>>, config: ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        Self { service: Service::with_transport(TasksClass, authorizer, config, transport) }
    }

    /// The underlying service, for its settings and generic operations
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Lists the task lists of the authenticated user
    pub async fn query_all_tasklists(
        &self,
        query: Option<&mut Query>,
        cancellable: Option<&Cancellable>,
        progress: Option<&mut ProgressCallback<'_, TaskList>>,
    ) -> Result<Option<Feed<TaskList>>> {
        self.service.query(Some(&tasks_domain()), TASKLISTS_URI, query, cancellable, progress).await
    }

    /// Lists the tasks of `tasklist`
    pub async fn query_tasks(
        &self,
        tasklist: &Entry<TaskList>,
        query: Option<&mut Query>,
        cancellable: Option<&Cancellable>,
        progress: Option<&mut ProgressCallback<'_, Task>>,
    ) -> Result<Option<Feed<Task>>> {
        let uri = tasks_uri(tasklist)?;
        self.service.query(Some(&tasks_domain()), &uri, query, cancellable, progress).await
    }

    pub async fn insert_task(&self, task: &Entry<Task>, tasklist: &Entry<TaskList>, cancellable: Option<&Cancellable>) -> Result<Entry<Task>> {
        let uri = tasks_uri(tasklist)?;
        self.service.insert_entry(Some(&tasks_domain()), &uri, task, cancellable).await
    }

    pub async fn insert_tasklist(&self, tasklist: &Entry<TaskList>, cancellable: Option<&Cancellable>) -> Result<Entry<TaskList>> {
        self.service.insert_entry(Some(&tasks_domain()), TASKLISTS_URI, tasklist, cancellable).await
    }

    pub async fn update_task(&self, task: &Entry<Task>, cancellable: Option<&Cancellable>) -> Result<Entry<Task>> {
        self.service.update_entry(Some(&tasks_domain()), task, cancellable).await
    }

    pub async fn update_tasklist(&self, tasklist: &Entry<TaskList>, cancellable: Option<&Cancellable>) -> Result<Entry<TaskList>> {
        self.service.update_entry(Some(&tasks_domain()), tasklist, cancellable).await
    }

    pub async fn delete_task(&self, task: &Entry<Task>, cancellable: Option<&Cancellable>) -> Result<bool> {
        self.service.delete_entry(Some(&tasks_domain()), task, cancellable).await
    }

    pub async fn delete_tasklist(&self, tasklist: &Entry<TaskList>, cancellable: Option<&Cancellable>) -> Result<bool> {
        self.service.delete_entry(Some(&tasks_domain()), tasklist, cancellable).await
    }
}

fn tasks_uri(tasklist: &Entry<TaskList>) -> Result<String> {
    match tasklist.id() {
        Some(id) => Ok(format!("{}/{}/tasks", LISTS_URI, id)),
        None => Err(Error::new(ErrorKind::BadQueryParameter, "The task list has not been inserted yet.")),
    }
}
