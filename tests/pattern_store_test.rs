//! Tests against the shipped pattern store in `patterns/`

mod common;

use common::{attrs, shipped_patterns};
use nomspan::{compile_dir, CompileOptions, NormalizationEngine, TransformRegistry};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, OnceLock};

fn engine() -> &'static NormalizationEngine {
    static ENGINE: OnceLock<NormalizationEngine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let output = compile_dir(shipped_patterns(), &CompileOptions::default()).unwrap();
        NormalizationEngine::new(Arc::new(output.bundle), TransformRegistry::builtin()).unwrap()
    })
}

#[test]
fn test_shipped_store_compiles_in_manifest_order() {
    let output = compile_dir(shipped_patterns(), &CompileOptions::default()).unwrap();

    assert_eq!(
        output.bundle.provider_ids(),
        vec!["openinference", "openllmetry", "otel_genai", "vercel_ai"]
    );
    assert!(output.warnings().is_empty());
}

#[test]
fn test_shipped_store_is_deterministic() {
    let first = compile_dir(shipped_patterns(), &CompileOptions::default()).unwrap();
    let second = compile_dir(shipped_patterns(), &CompileOptions::default()).unwrap();

    assert_eq!(first.bundle_bytes, second.bundle_bytes);
}

#[test]
fn test_every_signature_detects_its_provider() {
    let bundle = engine().bundle();

    for provider in &bundle.providers {
        for signature in &provider.signatures {
            let mut input: nomspan::Attributes = signature
                .required
                .iter()
                .map(|key| (key.clone(), json!("x")))
                .collect();
            input.insert("unrelated.key".to_string(), json!(true));

            assert_eq!(
                engine().detect(&input),
                provider.id,
                "signature {} should detect {}",
                signature.name,
                provider.id
            );
        }
    }
}

#[rstest]
#[case::openinference_llm(&["llm.input_messages", "llm.output_messages", "llm.model_name"], "openinference")]
#[case::openinference_chain(&["openinference.span.kind", "input.value", "output.value"], "openinference")]
#[case::openllmetry_prompt(&["gen_ai.system", "gen_ai.prompt.0.content"], "openllmetry")]
#[case::openllmetry_completion(&["gen_ai.system", "gen_ai.completion.0.content"], "openllmetry")]
#[case::otel_chat(&["gen_ai.operation.name", "gen_ai.input.messages"], "otel_genai")]
#[case::otel_request(&["gen_ai.operation.name", "gen_ai.request.model"], "otel_genai")]
#[case::vercel_messages(&["ai.model.id", "ai.prompt.messages"], "vercel_ai")]
#[case::vercel_prompt(&["ai.model.id", "ai.prompt"], "vercel_ai")]
#[case::partial_signature(&["llm.input_messages", "llm.model_name"], "unknown")]
#[case::empty(&[], "unknown")]
fn test_detection(#[case] keys: &[&str], #[case] expected: &str) {
    let input: nomspan::Attributes = keys
        .iter()
        .map(|key| (key.to_string(), JsonValue::Null))
        .collect();

    assert_eq!(engine().detect(&input), expected);
}

#[test]
fn test_openinference_chat_example() {
    let input = attrs(json!({
        "llm.input_messages": [{"role": "user", "content": "hi"}],
        "llm.output_messages": [{"role": "assistant", "content": "hello"}],
        "llm.model_name": "model-x"
    }));

    let record = engine().normalize(&input);

    assert_eq!(record.inputs["chat_history"], json!([{"role": "user", "content": "hi"}]));
    assert_eq!(record.config["model"], json!("model-x"));
    assert_eq!(record.metadata["provider"], json!("openinference"));
    assert_eq!(record.inputs["prompt"], json!("hi"));
    assert_eq!(record.outputs["completion"], json!("hello"));
    // declared fallback for an absent source
    assert_eq!(record.config["invocation_parameters"], json!({}));
}

#[test]
fn test_openinference_invocation_parameters_string() {
    let input = attrs(json!({
        "llm.input_messages": [
            {"role": "system", "content": "be terse"},
            {"role": "user", "content": "2+2?"}
        ],
        "llm.output_messages": [{"role": "assistant", "content": "4"}],
        "llm.model_name": "model-x",
        "llm.invocation_parameters": "{\"temperature\": 0.1, \"max_tokens\": 16}",
        "llm.token_count.prompt": 12,
        "llm.token_count.completion": 1
    }));

    let record = engine().normalize(&input);

    assert_eq!(record.inputs["system_prompt"], json!("be terse"));
    assert_eq!(record.config["temperature"], json!(0.1));
    assert_eq!(record.config["max_tokens"], json!(16));
    assert_eq!(record.metadata["total_tokens"], json!(13));
}

#[test]
fn test_openllmetry_indexed_messages() {
    let input = attrs(json!({
        "gen_ai.system": "openai",
        "gen_ai.request.model": "gpt-x",
        "gen_ai.prompt.0.role": "system",
        "gen_ai.prompt.0.content": "be kind",
        "gen_ai.prompt.1.role": "user",
        "gen_ai.prompt.1.content": "hello",
        "gen_ai.completion.0.role": "assistant",
        "gen_ai.completion.0.content": "hi there",
        "gen_ai.completion.0.finish_reason": "length"
    }));

    let record = engine().normalize(&input);

    assert_eq!(record.provider(), "openllmetry");
    assert_eq!(
        record.inputs["chat_history"],
        json!([
            {"role": "system", "content": "be kind"},
            {"role": "user", "content": "hello"}
        ])
    );
    assert_eq!(record.inputs["system_prompt"], json!("be kind"));
    assert_eq!(record.inputs["prompt"], json!("hello"));
    assert_eq!(record.outputs["completion"], json!("hi there"));
    assert_eq!(record.outputs["finish_reason"], json!("max_tokens"));
    assert_eq!(record.config["model"], json!("gpt-x"));
    assert_eq!(record.metadata["system"], json!("openai"));
}

#[test]
fn test_otel_genai_message_parts() {
    let input = attrs(json!({
        "gen_ai.operation.name": "chat",
        "gen_ai.provider.name": "anthropic",
        "gen_ai.request.model": "model-y",
        "gen_ai.input.messages": "[{\"role\":\"user\",\"parts\":[{\"type\":\"text\",\"content\":\"ping\"}]}]",
        "gen_ai.output.messages": "[{\"role\":\"assistant\",\"parts\":[{\"type\":\"text\",\"content\":\"pong\"}]}]",
        "gen_ai.response.finish_reasons": ["stop"],
        "gen_ai.usage.input_tokens": 3,
        "gen_ai.usage.output_tokens": 2
    }));

    let record = engine().normalize(&input);

    assert_eq!(record.provider(), "otel_genai");
    assert_eq!(record.inputs["prompt"], json!("ping"));
    assert_eq!(record.outputs["completion"], json!("pong"));
    assert_eq!(record.outputs["finish_reasons"], json!(["stop"]));
    assert_eq!(record.metadata["provider_name"], json!("anthropic"));
    assert_eq!(record.metadata["total_tokens"], json!(5));
    assert_eq!(record.inputs["chat_history"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_vercel_ai_settings_and_prompt() {
    let input = attrs(json!({
        "ai.model.id": "model-z",
        "ai.model.provider": "openai.chat",
        "ai.prompt": "{\"system\":\"be brief\",\"prompt\":\"tell me a joke\"}",
        "ai.settings.maxRetries": 2,
        "ai.settings.temperature": 0.5,
        "ai.response.text": "knock knock"
    }));

    let record = engine().normalize(&input);

    assert_eq!(record.provider(), "vercel_ai");
    assert_eq!(record.inputs["system_prompt"], json!("be brief"));
    assert_eq!(record.inputs["prompt_text"], json!("tell me a joke"));
    assert_eq!(record.inputs["chat_history"], json!([]));
    assert_eq!(
        record.config["settings"],
        json!({"maxRetries": 2, "temperature": 0.5})
    );
    assert_eq!(record.outputs["completion"], json!("knock knock"));
}

#[test]
fn test_unknown_example() {
    let record = engine().normalize(&attrs(json!({"custom.foo": "bar"})));

    assert_eq!(engine().detect(&attrs(json!({"custom.foo": "bar"}))), "unknown");
    assert_eq!(record.metadata["provider"], json!("unknown"));
    assert_eq!(record.metadata["foo"], json!("bar"));
}

#[test]
fn test_unknown_fallback_buckets() {
    let record = engine().normalize(&attrs(json!({
        "my.prompt": "q",
        "my.completion": "a",
        "my.model": "m"
    })));

    assert_eq!(record.inputs["prompt"], json!("q"));
    assert_eq!(record.outputs["completion"], json!("a"));
    assert_eq!(record.config["model"], json!("m"));
}
