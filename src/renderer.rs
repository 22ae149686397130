//! Template renderer.
//! Walks a compiled template against a scope chain and produces output
//! text. Rendering is all-or-nothing: output goes to a private buffer that
//! is only returned once the whole tree rendered successfully.
use crate::builtins;
use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use crate::constants::INLINE_IDENTITY;
use crate::context::RenderContext;
use crate::error::{Error, Result, TypeErrorKind};
use crate::expr::ast::ParamDecl;
use crate::expr::eval::bind_targets;
use crate::expr::{evaluate, execute, Expr};
use crate::loader::{join_identity, normalize_identity, MemoryResolver, TemplateResolver, TemplateSource};
use crate::template::{Node, Template};
use crate::value::{Map, Value};
use log::debug;
use std::sync::Arc;

/// Template engine: configuration, global functions, include resolver and
/// a shared template cache.
///
/// An `Engine` is cheap to share between threads; every render call gets
/// its own scope chain.
pub struct Engine {
    config: EngineConfig,
    globals: Arc<Map>,
    resolver: Arc<dyn TemplateResolver>,
    cache: Arc<TemplateCache>,
}

impl Engine {
    /// Creates an engine with the given limits, the builtin functions, no
    /// resolvable includes and a fresh cache.
    pub fn new(config: EngineConfig) -> Self {
        let globals = Arc::new(builtins::globals(config.max_iterations));
        Self {
            config,
            globals,
            resolver: Arc::new(MemoryResolver::new()),
            cache: Arc::new(TemplateCache::new()),
        }
    }

    pub fn with_resolver<R: TemplateResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Shares an existing cache, e.g. between engines with the same resolver.
    pub fn with_cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Adds a global visible to every template, shadowing builtins.
    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        Arc::make_mut(&mut self.globals).insert(name.into(), value.into());
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Loads a template by identity through the cache and resolver.
    pub fn load(&self, identity: &str) -> Result<Arc<Template>> {
        let identity = normalize_identity(identity).unwrap_or_else(|| identity.to_string());
        self.cache.get_or_compile(&identity, || {
            debug!("Resolving template '{identity}'");
            match self.resolver.resolve(&identity)? {
                TemplateSource::Text(text) => Template::parse(identity.as_str(), &text).map(Arc::new),
                TemplateSource::Template(template) => Ok(template),
            }
        })
    }

    /// Renders raw text or a compiled template with the caller's context.
    ///
    /// # Arguments
    /// * `source` - Template text or compiled handle
    /// * `context` - Variables visible to the template
    ///
    /// # Returns
    /// * `Result<String>` - The complete output, or the first error raised
    pub fn render(&self, source: impl Into<TemplateSource>, context: &Map) -> Result<String> {
        let template = match source.into() {
            TemplateSource::Text(text) => Arc::new(Template::parse(INLINE_IDENTITY, &text)?),
            TemplateSource::Template(template) => template,
        };
        self.render_template(&template, context.clone(), 0, false)
    }

    /// Like [`Engine::render`], with the context given as a JSON object.
    pub fn render_json(&self, source: impl Into<TemplateSource>, context: &serde_json::Value) -> Result<String> {
        let context = match Value::from_json(context) {
            Value::Map(entries) => entries.as_ref().clone(),
            Value::Null => Map::new(),
            other => {
                return Err(Error::type_error(TypeErrorKind::InvalidArgument(format!(
                    "context must be an object, got '{}'",
                    other.type_name()
                ))))
            }
        };
        self.render(source, &context)
    }

    /// Renders `template` with `args` as its root scope. `strict` rejects
    /// arguments the page contract does not declare.
    fn render_template(&self, template: &Template, args: Map, depth: usize, strict: bool) -> Result<String> {
        if strict && template.declares_params() {
            if let Some(unknown) = args.keys().find(|k| !template.params().iter().any(|p| &p.name == *k)) {
                return Err(Error::type_error(TypeErrorKind::UnexpectedArgument(unknown.clone())));
            }
        }

        let mut ctx =
            RenderContext::new(Arc::clone(&self.globals), args).with_iteration_limit(self.config.max_iterations);
        ctx.push_scope(Map::new());
        bind_params(template.params(), &mut ctx)?;

        let mut out = String::new();
        let mut renderer = Renderer { engine: self, template, depth };
        renderer.nodes(template.nodes(), &mut ctx, &mut out)?;
        Ok(out)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

/// Binds page parameters in the current scope: caller values win, then
/// defaults (evaluated left to right, so later defaults see earlier
/// parameters), otherwise `MissingArgument`.
fn bind_params(params: &[ParamDecl], ctx: &mut RenderContext) -> Result<()> {
    for param in params {
        let value = match (ctx.lookup_local(&param.name).cloned(), &param.default) {
            (Some(value), _) => value,
            (None, Some(default)) => evaluate(default, ctx)?,
            (None, None) => return Err(Error::MissingArgument { name: param.name.clone() }),
        };
        ctx.bind(param.name.clone(), value);
    }
    Ok(())
}

struct Renderer<'e> {
    engine: &'e Engine,
    template: &'e Template,
    depth: usize,
}

impl Renderer<'_> {
    fn nodes(&mut self, nodes: &[Node], ctx: &mut RenderContext, out: &mut String) -> Result<()> {
        for node in nodes {
            self.node(node, ctx, out)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node, ctx: &mut RenderContext, out: &mut String) -> Result<()> {
        match node {
            Node::Text(text) | Node::RawText(text) => out.push_str(text),
            Node::Comment => {}
            Node::Expr { expr, filters } => {
                let text = evaluate(expr, ctx)?.to_output();
                out.push_str(&filters.iter().fold(text, |text, filter| filter.apply(text)));
            }
            Node::Code(stmts) => execute(stmts, ctx)?,
            Node::If { branches, else_body } => {
                for (condition, body) in branches {
                    if evaluate(condition, ctx)?.is_truthy() {
                        return self.nodes(body, ctx, out);
                    }
                }
                if let Some(body) = else_body {
                    self.nodes(body, ctx, out)?;
                }
            }
            Node::For { names, iterable, body } => self.for_loop(names, iterable, body, ctx, out)?,
            Node::Include { file, args } => self.include(file, args, ctx, out)?,
        }
        Ok(())
    }

    fn for_loop(
        &mut self,
        names: &[String],
        iterable: &Expr,
        body: &[Node],
        ctx: &mut RenderContext,
        out: &mut String,
    ) -> Result<()> {
        let value = evaluate(iterable, ctx)?;
        let items = match (&value, names.len()) {
            (Value::Map(entries), 2) => entries
                .iter()
                .map(|(k, v)| Value::list(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
            _ => builtins::iterate(&value)?,
        };

        let limit = self.engine.config.max_iterations;
        if items.len() > limit {
            return Err(Error::IterationLimitExceeded { limit });
        }

        let length = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let mut scope = Map::new();
            scope.insert("loop".to_string(), loop_object(index, length));
            ctx.scoped(scope, |ctx| {
                bind_targets(names, item, ctx)?;
                self.nodes(body, ctx, out)
            })?;
        }
        Ok(())
    }

    fn include(&mut self, file: &Expr, args: &Expr, ctx: &mut RenderContext, out: &mut String) -> Result<()> {
        let target = evaluate(file, ctx)?.to_output();
        let identity = join_identity(self.template.identity(), &target);

        let args = match evaluate(args, ctx)? {
            Value::Map(entries) => entries.as_ref().clone(),
            other => {
                return Err(Error::type_error(TypeErrorKind::InvalidArgument(format!(
                    "include arguments must be a mapping, got '{}'",
                    other.type_name()
                ))))
            }
        };

        let limit = self.engine.config.max_include_depth;
        if self.depth >= limit {
            return Err(Error::RecursionLimitExceeded { depth: limit });
        }

        debug!("Including '{identity}' at depth {}", self.depth + 1);
        let included = self
            .engine
            .load(&identity)
            .map_err(|cause| Error::IncludeError { identity: identity.clone(), cause: Box::new(cause) })?;
        let text = self.engine.render_template(&included, args, self.depth + 1, true)?;
        out.push_str(&text);
        Ok(())
    }
}

fn loop_object(index: usize, length: usize) -> Value {
    let mut entries = Map::new();
    entries.insert("index".into(), Value::from(index));
    entries.insert("reverse_index".into(), Value::from(length - index - 1));
    entries.insert("first".into(), Value::Bool(index == 0));
    entries.insert("last".into(), Value::Bool(index + 1 == length));
    entries.insert("even".into(), Value::Bool(index % 2 == 0));
    entries.insert("odd".into(), Value::Bool(index % 2 == 1));
    entries.insert("length".into(), Value::from(length));
    Value::map(entries)
}
