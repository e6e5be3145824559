//! 工具参数 Schema：schemars 生成 JSON Schema，serde 反序列化即校验
//!
//! TypedTool 把「参数结构体 + 异步闭包」包装成 Tool；AnswerTool 是终止型工具（结构化输出）。

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::tools::{Tool, ToolKind};

/// 生成参数结构体的 JSON Schema（子 schema 内联，去掉 $schema / title）
pub fn schema_of<A: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let root = generator.into_root_schema_for::<A>();
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("type").or_insert_with(|| Value::String("object".to_string()));
    }
    schema
}

/// 按结构体 A 解析参数
pub fn parse_args<A: DeserializeOwned>(args: &Value) -> Result<A, String> {
    A::deserialize(args).map_err(|e| e.to_string())
}

/// 校验并规范化：解析为 A 后再序列化回 JSON（补齐默认值、去掉多余字段）
pub fn normalize_args<A: DeserializeOwned + Serialize>(args: Value) -> Result<Value, String> {
    let typed: A = parse_args(&args)?;
    serde_json::to_value(typed).map_err(|e| e.to_string())
}

type Handler<A> = dyn Fn(A) -> BoxFuture<'static, Result<Value, String>> + Send + Sync;

/// 强类型闭包工具
pub struct TypedTool<A> {
    name: String,
    description: String,
    schema: Value,
    cacheable: bool,
    handler: Arc<Handler<A>>,
    _args: PhantomData<fn() -> A>,
}

impl<A> TypedTool<A>
where
    A: DeserializeOwned + Serialize + JsonSchema + Send + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: schema_of::<A>(),
            cacheable: true,
            handler: Arc::new(move |args| f(args).boxed()),
            _args: PhantomData,
        }
    }

    /// 标记为有副作用（每次调用都执行，不走缓存）
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

#[async_trait]
impl<A> Tool for TypedTool<A>
where
    A: DeserializeOwned + Serialize + JsonSchema + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate(&self, args: Value) -> Result<Value, String> {
        normalize_args::<A>(args)
    }

    fn cacheable(&self) -> bool {
        self.cacheable
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let typed: A = parse_args(&args)?;
        (self.handler)(typed).await
    }
}

/// 终止型工具：参数即最终结构化输出，调用后 Runner 不再发起下一步
pub struct AnswerTool<A> {
    name: String,
    description: String,
    schema: Value,
    _args: PhantomData<fn() -> A>,
}

impl<A> AnswerTool<A>
where
    A: DeserializeOwned + Serialize + JsonSchema + Send + 'static,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: schema_of::<A>(),
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<A> Tool for AnswerTool<A>
where
    A: DeserializeOwned + Serialize + JsonSchema + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate(&self, args: Value) -> Result<Value, String> {
        normalize_args::<A>(args)
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Terminal
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}
