use proc_macro::TokenStream;
use quote::quote;

use syn::spanned::Spanned as _;
use syn::{Attribute, Data, DeriveInput, Error, Fields};

const SCOPED_ATTR: &str = "scoped";

struct ScopedOptions {
    release: bool,
}

fn parse_scoped_options(attrs: &[Attribute]) -> Result<ScopedOptions, Error> {
    let mut options = ScopedOptions { release: false };
    for attr in attrs {
        if !attr.path().is_ident(SCOPED_ATTR) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("release") {
                options.release = true;
                Ok(())
            } else {
                Err(meta.error(format!("Unsupported #[{SCOPED_ATTR}] option")))
            }
        })?;
    }
    Ok(options)
}

/// Derives `ScopedService` for a struct whose fields are all capability
/// handles.
///
/// Every field is resolved from the scope by its type, in declaration order.
/// The generated handle is `Arc<Self>`. With `#[scoped(release)]` the
/// struct's `Release` implementation runs when the scope closes.
#[proc_macro_derive(ScopedService, attributes(scoped))]
pub fn derive_scoped_service(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match handle_derive_scoped_service(input) {
        Ok(v) => v.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn handle_derive_scoped_service(input: DeriveInput) -> Result<proc_macro2::TokenStream, Error> {
    let name = &input.ident;
    let options = parse_scoped_options(&input.attrs)?;
    let fields = match &input.data {
        Data::Struct(s) => &s.fields,
        _ => return Err(Error::new(name.span(), "Only structs are supported")),
    };
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Generic scoped services are not supported",
        ));
    }

    let mut field_lets = Vec::new();
    let mut field_inits = Vec::new();
    match fields {
        Fields::Named(fields) => {
            for field in &fields.named {
                let Some(field_ident) = field.ident.as_ref() else {
                    continue;
                };
                let field_ty = &field.ty;
                field_lets.push(quote! {
                    let #field_ident = scope.resolve::<#field_ty>().await?;
                });
                field_inits.push(quote! { #field_ident });
            }
        }
        Fields::Unnamed(_) => {
            return Err(Error::new(name.span(), "Tuple structs are not supported"));
        }
        Fields::Unit => {}
    }

    let release = options.release.then(|| {
        quote! {
            fn release(handle: &Self::Handle) {
                <Self as ::lifespan::Release>::release(&**handle);
            }
        }
    });

    Ok(quote! {
        impl ::lifespan::ScopedService for #name {
            type Handle = ::std::sync::Arc<Self>;

            async fn build(
                scope: &::lifespan::Scope
            ) -> Result<Self::Handle, ::lifespan::StdError> {
                #(#field_lets)*
                Ok(::std::sync::Arc::new(Self {
                    #(#field_inits,)*
                }))
            }

            #release
        }
    })
}
