//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了oxtier的宏实现，提供缓存注解功能。
//!
//! `#[cacheable(operation = "name")]` 将函数体作为回源函数，
//! 由所有参数按声明顺序构建缓存键，并通过已配置的同名操作解析。

use darling::{ast::NestedMeta, FromMeta};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, FnArg, Ident, ItemFn, Pat, ReturnType, Signature, Type, TypeParamBound,
};

#[derive(Debug, FromMeta)]
struct CacheableArgs {
    /// 配置中的操作名称
    operation: String,
    /// 函数返回 `Result<Option<T>, E>`，缺失的结果不写入缓存
    #[darling(default)]
    optional: bool,
}

#[proc_macro_attribute]
pub fn cacheable(args: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args = match NestedMeta::parse_meta_list(args.into()) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(darling::Error::from(e).write_errors()),
    };
    let args = match CacheableArgs::from_list(&attr_args) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.write_errors()),
    };
    let input = parse_macro_input!(item as ItemFn);

    match expand(&args, input) {
        Ok(output) => output.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(args: &CacheableArgs, input: ItemFn) -> syn::Result<TokenStream2> {
    check_return_type(&input.sig)?;
    let key_args = key_arguments(&input.sig)?;
    if key_args.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "#[cacheable] requires at least one key argument",
        ));
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let operation = &args.operation;
    let names: Vec<String> = key_args.iter().map(|arg| arg.to_string()).collect();

    let resolve = match (sig.asyncness.is_some(), args.optional) {
        (false, false) => quote! {
            ::oxtier::manager::resolve_named(#operation, &[#(#names),*], __oxtier_key, move || #block)
        },
        (false, true) => quote! {
            ::oxtier::manager::resolve_named_optional(#operation, &[#(#names),*], __oxtier_key, move || #block)
        },
        (true, false) => quote! {
            ::oxtier::manager::resolve_named_async(#operation, &[#(#names),*], __oxtier_key, move || async move #block).await
        },
        (true, true) => quote! {
            ::oxtier::manager::resolve_named_optional_async(#operation, &[#(#names),*], __oxtier_key, move || async move #block).await
        },
    };

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            let __oxtier_key = ::oxtier::key::build_key((#(::core::clone::Clone::clone(&#key_args),)*));
            #resolve
        }
    })
}

/// 收集所有带类型的参数名，`self` 不参与构建缓存键
fn key_arguments(sig: &Signature) -> syn::Result<Vec<Ident>> {
    let mut names = Vec::new();
    for arg in &sig.inputs {
        if let FnArg::Typed(pat_type) = arg {
            match pat_type.pat.as_ref() {
                Pat::Ident(pat_ident) => names.push(pat_ident.ident.clone()),
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "#[cacheable] key arguments must be plain identifiers",
                    ))
                }
            }
        }
    }
    Ok(names)
}

fn check_return_type(sig: &Signature) -> syn::Result<()> {
    let ty = match &sig.output {
        ReturnType::Default => {
            return Err(syn::Error::new_spanned(
                sig,
                "#[cacheable] functions must return a Result",
            ))
        }
        ReturnType::Type(_, ty) => ty,
    };

    if let Type::ImplTrait(impl_trait) = ty.as_ref() {
        let deferred = impl_trait.bounds.iter().any(|bound| match bound {
            TypeParamBound::Trait(t) => t
                .path
                .segments
                .last()
                .map(|seg| seg.ident == "Future" || seg.ident == "Stream")
                .unwrap_or(false),
            _ => false,
        });
        let message = if deferred {
            "#[cacheable] cannot cache a deferred value; declare the function `async` and return the resolved Result"
        } else {
            "#[cacheable] cannot cache an opaque `impl Trait` return type"
        };
        return Err(syn::Error::new_spanned(ty, message));
    }

    Ok(())
}
