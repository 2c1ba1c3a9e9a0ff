use proc_macro::TokenStream;
use quote::quote;
use syn::{
  parse::{Parse, ParseStream},
  ItemFn,
};

/// Log level requested by the attribute, e.g. `#[trellis_test::test(info)]`.
struct Args {
  level: proc_macro2::TokenStream,
}

impl Parse for Args {
  fn parse(input: ParseStream) -> syn::Result<Self> {
    if input.is_empty() {
      return Ok(Self {
        level: quote! { log::Level::Trace },
      });
    }

    let ident = input.parse::<syn::Ident>()?;
    let level = match ident.to_string().as_str() {
      "error" => quote! { log::Level::Error },
      "warn" => quote! { log::Level::Warn },
      "info" => quote! { log::Level::Info },
      "debug" => quote! { log::Level::Debug },
      "trace" => quote! { log::Level::Trace },
      other => {
        return Err(syn::Error::new(
          ident.span(),
          format!("Unknown log level `{}`", other),
        ))
      }
    };

    Ok(Self { level })
  }
}

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let item_fn = syn::parse_macro_input!(item as ItemFn);
  let args = syn::parse_macro_input!(attr as Args);

  let attrs = item_fn.attrs;
  let test_name = item_fn.sig.ident;
  let output = item_fn.sig.output;
  let content = item_fn.block;
  let level = args.level;

  let content = quote! {
    trellis_logger::init_logger_with_level(#level);

    #content
  };

  if item_fn.sig.asyncness.is_some() {
    return quote! {
      #(#attrs)*
      #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
      async fn #test_name() #output {
        #content
      }
    }
    .into();
  }

  quote! {
    #(#attrs)*
    #[test]
    fn #test_name() #output {
      #content
    }
  }
  .into()
}
