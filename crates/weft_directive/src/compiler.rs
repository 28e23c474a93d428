//! Directive compiler
//!
//! One `parse` pass walks the element tree, stamps stable `data-key`
//! identities, lifts directive attributes, and wires them into the core
//! runtime: state directives become two-way value bindings with handler
//! chains, view directives become render subscriptions, control directives
//! become event actions with chain operators, conditional directives drive
//! visibility, and list directives stamp template clones per item.
//!
//! Processed attributes are stripped, so parsing twice binds nothing
//! twice. Template subtrees are inert until a list directive stamps them.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use weft_core::{
    BindingRegistry, ElementId, ElementRenderFn, ElementTree, EventObject, EventPipeline,
    ReactiveStore, Result, Settled, StateView, Value, WeftError,
};

use crate::grammar::{
    parse_control_expr, parse_state_expr, ChainOp, ChainStage, ControlExpr, Directive,
    DirectiveFamily,
};
use crate::host::{HandlerCall, HandlerOutcome, ModuleHost};
use crate::scope::ItemContext;

/// Compiler knobs
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Prefix for stamped `data-key` attributes
    pub name: String,
    /// Event a state directive listens on when its value names none
    pub default_event: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            name: "module".to_string(),
            default_event: "input".to_string(),
        }
    }
}

struct CompilerInner {
    store: ReactiveStore,
    registry: BindingRegistry,
    pipeline: EventPipeline,
    tree: Rc<RefCell<ElementTree>>,
    host: Rc<dyn ModuleHost>,
    options: EngineOptions,
    stamp_counter: Cell<u64>,
}

/// Walks the tree and compiles directive attributes into live bindings
#[derive(Clone)]
pub struct DirectiveCompiler {
    inner: Rc<CompilerInner>,
}

impl DirectiveCompiler {
    pub fn new(
        store: ReactiveStore,
        registry: BindingRegistry,
        pipeline: EventPipeline,
        tree: Rc<RefCell<ElementTree>>,
        host: Rc<dyn ModuleHost>,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Rc::new(CompilerInner {
                store,
                registry,
                pipeline,
                tree,
                host,
                options,
                stamp_counter: Cell::new(0),
            }),
        }
    }

    /// Compile every directive under `root` (defaults to the tree root)
    ///
    /// Families are processed state, list, view, control, conditional, so
    /// that list templates see their item state before one-way bindings
    /// attach. Safe to call again: consumed attributes are gone.
    pub fn parse(&self, root: Option<ElementId>) -> Result<()> {
        let root = root.unwrap_or_else(|| self.inner.tree.borrow().root());
        ensure_data_keys(&self.inner, root);

        let directives = collect_directives(&self.inner, root);
        let order = [
            DirectiveFamily::State,
            DirectiveFamily::List,
            DirectiveFamily::View,
            DirectiveFamily::Control,
            DirectiveFamily::Conditional,
        ];
        for family in order {
            for directive in directives.iter().filter(|d| d.family == family) {
                process_directive(&self.inner, directive, None)?;
                strip_attribute(&self.inner, directive);
            }
        }
        Ok(())
    }
}

// ─── Tree walking ───────────────────────────────────────────────────────

/// Stamp a `data-key` on every element under `root` that lacks one
///
/// Template content is left unstamped; clones get keys when a list pass
/// stamps them into the live tree.
fn ensure_data_keys(inner: &Rc<CompilerInner>, root: ElementId) {
    let mut pending = vec![root];
    while let Some(id) = pending.pop() {
        let (has_key, is_template, children) = {
            let tree = inner.tree.borrow();
            (
                tree.attribute(id, "data-key").is_some(),
                tree.is_template(id),
                tree.children(id),
            )
        };
        if !has_key {
            let counter = inner.stamp_counter.get();
            inner.stamp_counter.set(counter + 1);
            let key = format!("{}-{}", inner.options.name, counter);
            inner.tree.borrow_mut().set_attribute(id, "data-key", &key);
        }
        if !is_template {
            // reversed so pop order stays preorder
            let mut children = children;
            children.reverse();
            pending.extend(children);
        }
    }
}

/// Lift directive attributes off every element under `root`, preorder,
/// not descending into template content
fn collect_directives(inner: &Rc<CompilerInner>, root: ElementId) -> Vec<Directive> {
    let tree = inner.tree.borrow();
    let mut directives = Vec::new();
    let mut pending = vec![root];
    while let Some(id) = pending.pop() {
        for (attribute, expr) in tree.attributes(id) {
            if let Some((family, name)) = DirectiveFamily::from_attribute(&attribute) {
                directives.push(Directive {
                    family,
                    element: id,
                    name: name.to_string(),
                    expr,
                });
            }
        }
        if !tree.is_template(id) {
            // reversed so pop order stays preorder
            let mut children = tree.children(id);
            children.reverse();
            pending.extend(children);
        }
    }
    directives
}

fn strip_attribute(inner: &Rc<CompilerInner>, directive: &Directive) {
    let attribute = format!("{}{}", directive.family.prefix(), directive.name);
    inner
        .tree
        .borrow_mut()
        .remove_attribute(directive.element, &attribute);
}

fn process_directive(
    inner: &Rc<CompilerInner>,
    directive: &Directive,
    ctx: Option<&ItemContext>,
) -> Result<()> {
    match directive.family {
        DirectiveFamily::State => handle_state(inner, directive, ctx.cloned()),
        DirectiveFamily::View => handle_view(inner, directive, ctx),
        DirectiveFamily::Control => handle_control(inner, directive, ctx.cloned()),
        DirectiveFamily::Conditional => handle_conditional(inner, directive, ctx),
        DirectiveFamily::List => {
            if ctx.is_some() {
                tracing::debug!(name = %directive.name, "nested list directive skipped");
                return Ok(());
            }
            handle_list(inner, directive)
        }
    }
}

// ─── State directives ───────────────────────────────────────────────────

/// `s-key="event|handlerA&handlerB"` - two-way binding
///
/// Store changes flow into the element's form value; the named event runs
/// the handler chain over the element's value and writes the result back
/// to the store.
fn handle_state(
    inner: &Rc<CompilerInner>,
    directive: &Directive,
    ctx: Option<ItemContext>,
) -> Result<()> {
    let expr = parse_state_expr(&directive.expr, &inner.options.default_event)?;
    let key = directive.name.clone();
    let element = directive.element;

    // store -> element value sync
    let render: ElementRenderFn = {
        let tree = inner.tree.clone();
        Rc::new(move |value, element, _key| {
            tree.borrow_mut().set_value(element, &value.to_text());
        })
    };
    inner
        .registry
        .bind_render_to_element(&key, element, Some(render))?;
    if let Some(current) = inner.store.get(&key) {
        inner
            .tree
            .borrow_mut()
            .set_value(element, &current.to_text());
    }

    // element event -> chain -> store
    let weak = Rc::downgrade(inner);
    let chain = expr.chain;
    inner.pipeline.bind_element_event(
        element,
        &expr.event,
        Rc::new(move |event, element, snapshot| {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            run_state_chain(&inner, &key, &chain, event, element, snapshot, ctx.as_ref())
        }),
    )
}

fn run_state_chain(
    inner: &Rc<CompilerInner>,
    key: &str,
    chain: &[ChainStage],
    event: &EventObject,
    element: ElementId,
    snapshot: &StateView,
    ctx: Option<&ItemContext>,
) -> Result<()> {
    // the event detail wins when present; only a null detail falls back
    // to the element's form value, so an empty string stays deliverable
    let mut current = match &event.detail {
        Value::Null => Value::from(inner.tree.borrow().value_of(element)),
        detail => detail.clone(),
    };

    let scope = match ctx {
        Some(ctx) => ctx.merge_into(snapshot.clone()),
        None => snapshot.clone(),
    };

    for stage in chain {
        let Some(handler) = inner.host.resolve_handler(&stage.handler) else {
            tracing::warn!(handler = %stage.handler, "unresolved chain handler skipped");
            continue;
        };
        let outcome = handler(HandlerCall {
            event: Some(event),
            input: current.clone(),
            element,
            scope: &scope,
        });
        let produced = match outcome {
            HandlerOutcome::Value(value) => value,
            HandlerOutcome::Deferred(_) => {
                tracing::warn!(
                    handler = %stage.handler,
                    "deferred outcome in state chain treated as null"
                );
                Value::Null
            }
        };
        if produced.is_invalid() {
            match stage.op {
                Some(ChainOp::SoftStop) => return Ok(()),
                Some(ChainOp::HardStop) => {
                    return Err(WeftError::ChainHardStop(stage.handler.clone()))
                }
                // no stop requested: keep the previous value and continue
                _ => continue,
            }
        }
        current = produced;
    }

    inner.store.set_state(key, current)
}

// ─── View directives ────────────────────────────────────────────────────

/// `v-key="renderer"` - one-way render binding
///
/// Top level subscribes to the key; inside an item scope the value is
/// rendered once, since a list re-stamp replaces the clone wholesale.
fn handle_view(
    inner: &Rc<CompilerInner>,
    directive: &Directive,
    ctx: Option<&ItemContext>,
) -> Result<()> {
    let renderer_name = directive.expr.trim().to_string();
    let element = directive.element;

    if let Some(ctx) = ctx {
        let value = ctx
            .lookup(&directive.name)
            .or_else(|| inner.store.state_view().lookup(&directive.name).cloned())
            .unwrap_or_default();
        render_view_value(inner, &renderer_name, &value, element);
        return Ok(());
    }

    let weak = Rc::downgrade(inner);
    let renderer_for_binding = renderer_name.clone();
    let render: ElementRenderFn = Rc::new(move |value, element, _key| {
        if let Some(inner) = weak.upgrade() {
            render_view_value(&inner, &renderer_for_binding, value, element);
        }
    });
    inner
        .registry
        .bind_render_to_element(&directive.name, element, Some(render))?;

    let initial = inner.store.get(&directive.name).unwrap_or_default();
    render_view_value(inner, &renderer_name, &initial, element);
    Ok(())
}

/// Resolve the named renderer late; fall back to text when it is absent
fn render_view_value(inner: &Rc<CompilerInner>, renderer: &str, value: &Value, element: ElementId) {
    let resolved = if renderer.is_empty() {
        None
    } else {
        let resolved = inner.host.resolve_renderer(renderer);
        if resolved.is_none() {
            tracing::warn!(renderer, "unresolved renderer, falling back to text");
        }
        resolved
    };
    match resolved {
        Some(renderer) => renderer(value, element, &mut inner.tree.borrow_mut()),
        None => inner.tree.borrow_mut().set_text(element, &value.to_text()),
    }
}

// ─── Control directives ─────────────────────────────────────────────────

/// `c-event="action<op>details"` - event action with chain operator
fn handle_control(
    inner: &Rc<CompilerInner>,
    directive: &Directive,
    ctx: Option<ItemContext>,
) -> Result<()> {
    let expr = parse_control_expr(&directive.expr)?;
    let weak = Rc::downgrade(inner);
    inner.pipeline.bind_element_event(
        directive.element,
        &directive.name,
        Rc::new(move |event, element, snapshot| {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            run_control(&inner, &expr, event, element, snapshot, ctx.as_ref())
        }),
    )
}

fn run_control(
    inner: &Rc<CompilerInner>,
    expr: &ControlExpr,
    event: &EventObject,
    element: ElementId,
    snapshot: &StateView,
    ctx: Option<&ItemContext>,
) -> Result<()> {
    let mut scope = match ctx {
        Some(ctx) => ctx.merge_into(snapshot.clone()),
        None => snapshot.clone(),
    };
    if expr.op == Some(ChainOp::Detail) {
        if let Some(details) = &expr.details {
            scope = scope.with_entry("actionDetails", Value::from(details.as_str()));
        }
    }

    let Some(handler) = inner.host.resolve_handler(&expr.action) else {
        tracing::warn!(action = %expr.action, "unresolved control action ignored");
        return Ok(());
    };
    let outcome = handler(HandlerCall {
        event: Some(event),
        input: event.detail.clone(),
        element,
        scope: &scope,
    });

    // the async operator is the only consumer of a deferred outcome
    if expr.op == Some(ChainOp::AsyncDispatch) {
        let HandlerOutcome::Deferred(deferred) = outcome else {
            return Err(WeftError::NotCallable(expr.action.clone()));
        };
        let Some(bus_event) = expr.details.as_deref().map(bus_event_name) else {
            tracing::warn!(action = %expr.action, "async dispatch without a bus event");
            return Ok(());
        };
        let handle = inner.pipeline.handle();
        let action = expr.action.clone();
        deferred.on_settle(move |settled| match settled {
            Settled::Resolved(value) => {
                handle.dispatch(&bus_event, result_payload(value.clone()));
            }
            Settled::Rejected(reason) => {
                tracing::warn!(action = %action, reason, "deferred action rejected");
            }
        });
        return Ok(());
    }

    let result = match outcome {
        HandlerOutcome::Value(value) => value,
        HandlerOutcome::Deferred(_) => {
            tracing::warn!(
                action = %expr.action,
                "deferred outcome requires the async operator; dropped"
            );
            return Ok(());
        }
    };

    match expr.op {
        None | Some(ChainOp::Detail) => Ok(()),
        Some(ChainOp::SoftStop) => {
            if result.is_invalid() {
                return Ok(());
            }
            run_follow_up(inner, expr, event, element, &scope, result)
        }
        Some(ChainOp::HardStop) => {
            if result.is_invalid() {
                return Err(WeftError::ChainHardStop(expr.action.clone()));
            }
            run_follow_up(inner, expr, event, element, &scope, result)
        }
        Some(ChainOp::Dispatch) => {
            match &expr.details {
                Some(details) => inner
                    .pipeline
                    .dispatch(&bus_event_name(details), result_payload(result)),
                None => tracing::warn!(action = %expr.action, "dispatch without a bus event"),
            }
            Ok(())
        }
        Some(ChainOp::Broadcast) => {
            let Some(details) = &expr.details else {
                tracing::warn!(action = %expr.action, "broadcast without bus events");
                return Ok(());
            };
            let payload = result_payload(result);
            for bus_event in details.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                inner.pipeline.dispatch(bus_event, payload.clone());
            }
            Ok(())
        }
        Some(ChainOp::Rebind) => {
            let Some(details) = &expr.details else {
                tracing::warn!(action = %expr.action, "rebind without a target");
                return Ok(());
            };
            let (new_event, follow_up) = match details.split_once(':') {
                Some((event, handler)) => (event.trim(), handler.trim()),
                None => (details.as_str(), expr.action.as_str()),
            };
            bind_rebound_handler(inner, element, new_event, follow_up)
        }
        Some(ChainOp::AsyncDispatch) => unreachable!("handled above"),
    }
}

/// Invoke the follow-up handler named by the operator details
///
/// `save&notify:done` feeds `save`'s result into `notify`; the segment
/// after `:` is exposed as `actionDetails`.
fn run_follow_up(
    inner: &Rc<CompilerInner>,
    expr: &ControlExpr,
    event: &EventObject,
    element: ElementId,
    scope: &StateView,
    result: Value,
) -> Result<()> {
    let Some(details) = &expr.details else {
        tracing::warn!(action = %expr.action, "chain operator without a follow-up handler");
        return Ok(());
    };
    let (name, extra) = match details.split_once(':') {
        Some((name, extra)) => (name.trim(), Some(extra.trim())),
        None => (details.as_str(), None),
    };
    let Some(follow_up) = inner.host.resolve_handler(name) else {
        tracing::warn!(handler = name, "unresolved follow-up handler skipped");
        return Ok(());
    };

    let scope = match extra {
        Some(extra) => scope.clone().with_entry("actionDetails", Value::from(extra)),
        None => scope.clone(),
    };
    follow_up(HandlerCall {
        event: Some(event),
        input: result,
        element,
        scope: &scope,
    });
    Ok(())
}

/// Attach a runtime-created event binding (`<` operator)
fn bind_rebound_handler(
    inner: &Rc<CompilerInner>,
    element: ElementId,
    event: &str,
    handler_name: &str,
) -> Result<()> {
    let weak = Rc::downgrade(inner);
    let handler_name = handler_name.to_string();
    inner.pipeline.bind_element_event(
        element,
        event,
        Rc::new(move |event, element, snapshot| {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            let Some(handler) = inner.host.resolve_handler(&handler_name) else {
                tracing::warn!(handler = %handler_name, "unresolved rebound handler ignored");
                return Ok(());
            };
            handler(HandlerCall {
                event: Some(event),
                input: event.detail.clone(),
                element,
                scope: snapshot,
            });
            Ok(())
        }),
    )
}

/// Bus event named by operator details: the segment before any `:`
fn bus_event_name(details: &str) -> String {
    details
        .split_once(':')
        .map(|(event, _)| event)
        .unwrap_or(details)
        .trim()
        .to_string()
}

fn result_payload(result: Value) -> Value {
    let mut payload = IndexMap::new();
    payload.insert("result".to_string(), result);
    Value::Map(payload)
}

// ─── Conditional directives ─────────────────────────────────────────────

/// `f-key="state.path"` - visibility from a truthiness path
///
/// The path defaults to the directive name when the value is empty. Top
/// level re-evaluates whenever the path's root key changes.
fn handle_conditional(
    inner: &Rc<CompilerInner>,
    directive: &Directive,
    ctx: Option<&ItemContext>,
) -> Result<()> {
    let path = if directive.expr.trim().is_empty() {
        directive.name.clone()
    } else {
        directive.expr.trim().to_string()
    };
    let element = directive.element;

    if let Some(ctx) = ctx {
        let truthy = ctx
            .lookup(&path)
            .or_else(|| inner.store.state_view().lookup(&path).cloned())
            .map(|value| value.is_truthy())
            .unwrap_or(false);
        inner.tree.borrow_mut().set_visible(element, truthy);
        return Ok(());
    }

    let root_key = path.split('.').next().unwrap_or(&path).to_string();
    let weak = Rc::downgrade(inner);
    let watched_path = path.clone();
    let render: ElementRenderFn = Rc::new(move |_value, element, _key| {
        if let Some(inner) = weak.upgrade() {
            apply_visibility(&inner, &watched_path, element);
        }
    });
    inner
        .registry
        .bind_render_to_element(&root_key, element, Some(render))?;
    apply_visibility(inner, &path, element);
    Ok(())
}

fn apply_visibility(inner: &Rc<CompilerInner>, path: &str, element: ElementId) {
    let truthy = inner
        .store
        .state_view()
        .lookup(path)
        .map(|value| value.is_truthy())
        .unwrap_or(false);
    inner.tree.borrow_mut().set_visible(element, truthy);
}

// ─── List directives ────────────────────────────────────────────────────

/// `l-key` on a template - stamp one clone set per list item
///
/// Replace-all semantics: every generated clone is discarded and the
/// template is stamped once per current item, so N items before and M
/// after always leaves exactly M clone sets.
fn handle_list(inner: &Rc<CompilerInner>, directive: &Directive) -> Result<()> {
    let template = directive.element;
    if !inner.tree.borrow().is_template(template) {
        return Err(WeftError::InvalidTarget);
    }

    let items = inner
        .store
        .get(&directive.name)
        .and_then(|value| value.as_list().cloned())
        .unwrap_or_default();
    render_list(inner, template, &items)?;

    let weak = Rc::downgrade(inner);
    let render: ElementRenderFn = Rc::new(move |value, template, key| {
        let Some(inner) = weak.upgrade() else { return };
        let items = value.as_list().cloned().unwrap_or_default();
        if let Err(error) = render_list(&inner, template, &items) {
            tracing::warn!(key, %error, "list re-render failed");
        }
    });
    inner
        .registry
        .bind_render_to_element(&directive.name, template, Some(render))
}

fn render_list(inner: &Rc<CompilerInner>, template: ElementId, items: &[Value]) -> Result<()> {
    let Some(parent) = inner.tree.borrow().parent(template) else {
        tracing::warn!("list template has no parent; nothing to stamp");
        return Ok(());
    };

    // detach everything wired through the stale clones before dropping them
    let stale: Vec<ElementId> = {
        let tree = inner.tree.borrow();
        tree.children(parent)
            .into_iter()
            .filter(|&child| tree.generated_by(child) == Some(template))
            .flat_map(|root| {
                let mut subtree = vec![root];
                subtree.extend(tree.descendants(root));
                subtree
            })
            .collect()
    };
    for element in &stale {
        inner.pipeline.detach_all_events(*element);
        inner.registry.remove_renders_for_element(*element);
    }
    inner.tree.borrow_mut().remove_generated(parent, template);

    let template_children = inner.tree.borrow().children(template);
    for (index, item) in items.iter().enumerate() {
        let ctx = ItemContext::new(item.clone(), items.to_vec(), index);
        for &source in &template_children {
            let clone = inner
                .tree
                .borrow_mut()
                .clone_subtree(source, parent, Some(template));
            process_stamped(inner, clone, &ctx)?;
        }
    }
    Ok(())
}

/// Compile directives inside one freshly stamped clone
///
/// Attributes are stripped from the clone only; the template keeps its
/// originals for the next stamp.
fn process_stamped(inner: &Rc<CompilerInner>, clone: ElementId, ctx: &ItemContext) -> Result<()> {
    ensure_data_keys(inner, clone);
    let directives = collect_directives(inner, clone);
    let order = [
        DirectiveFamily::View,
        DirectiveFamily::Conditional,
        DirectiveFamily::Control,
        DirectiveFamily::State,
        DirectiveFamily::List,
    ];
    for family in order {
        for directive in directives.iter().filter(|d| d.family == family) {
            process_directive(inner, directive, Some(ctx))?;
            strip_attribute(inner, directive);
        }
    }
    Ok(())
}
