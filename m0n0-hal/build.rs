use std::env;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use proc_macro2::{Literal, TokenStream};
use quote::format_ident;
use quote::quote;

mod build_serde;
// Structures imported from build_serde.rs
use build_serde::{Access, Addressing, Block, FieldSet, Interrupts, Peripherals, IR};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Retrieve all enabled features
    let chip_name = match env::vars()
        .map(|(a, _)| a)
        .filter(|x| x.starts_with("CARGO_FEATURE_M0N0"))
        .get_one()
    {
        Ok(x) => x,
        Err(GetOneError::None) => panic!("No m0n0 chip feature enabled"),
        Err(GetOneError::Multiple) => panic!("Multiple m0n0 chip features enabled"),
    }
        .strip_prefix("CARGO_FEATURE_")
        .ok_or("malformed chip feature")?
        .to_ascii_lowercase();

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=build_serde.rs");
    println!("cargo:rerun-if-changed=data/{}", chip_name);
    let data_dir = Path::new("data").join(&chip_name);

    // Read and parse registers.yaml
    let registers_path = data_dir.join("registers.yaml");
    let registers_content = fs::read_to_string(&registers_path)
        .map_err(|e| format!("Failed to read registers.yaml: {}", e))?;
    let ir: IR = serde_yaml::from_str(&registers_content)
        .map_err(|e| format!("Failed to parse registers.yaml: {}", e))?;

    // Read and parse peripherals.yaml
    let peripherals_path = data_dir.join("peripherals.yaml");
    let peripherals_content = fs::read_to_string(&peripherals_path)
        .map_err(|e| format!("Failed to read peripherals.yaml: {}", e))?;
    let peripherals: Peripherals = serde_yaml::from_str(&peripherals_content)
        .map_err(|e| format!("Failed to parse peripherals.yaml: {}", e))?;

    // Read and parse interrupts.yaml
    let interrupts_path = data_dir.join("interrupts.yaml");
    let interrupts_content = fs::read_to_string(&interrupts_path)
        .map_err(|e| format!("Failed to read interrupts.yaml: {}", e))?;
    let interrupts: Interrupts = serde_yaml::from_str(&interrupts_content)
        .map_err(|e| format!("Failed to parse interrupts.yaml: {}", e))?;

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let dest_path = out_dir.join("_generated.rs");

    let mut token_stream = TokenStream::new();

    // Generate memory-mapped register windows
    token_stream.extend(generate_peripheral_mods(&peripherals, &ir)?);

    // Generate PCSM register indices
    let pcsm = ir.blocks.get("PCSM").ok_or("PCSM block not found")?;
    token_stream.extend(generate_pcsm_mod(pcsm, &ir)?);

    // Generate interrupt enum and vector table
    token_stream.extend(generate_interrupts(&interrupts));

    let mut file = File::create(&dest_path)?;
    write!(file, "{}", token_stream)?;
    rustfmt(&dest_path);

    // device.x for cortex-m-rt's `device` feature
    let mut device_x = String::new();
    for irq in &interrupts.m33 {
        device_x.push_str(&format!("PROVIDE({} = DefaultHandler);\n", irq.name));
    }
    fs::write(out_dir.join("device.x"), device_x)?;
    println!("cargo:rustc-link-search={}", out_dir.display());

    Ok(())
}

fn generate_peripheral_mods(
    peripherals: &Peripherals,
    ir: &IR,
) -> Result<TokenStream, Box<dyn std::error::Error>> {
    let mut mods = TokenStream::new();

    for peripheral in &peripherals.m33 {
        let block = ir
            .blocks
            .get(&peripheral.block)
            .ok_or_else(|| format!("block {} not found for {}", peripheral.block, peripheral.name))?;

        let mod_name = format_ident!("{}", peripheral.name.to_lowercase());
        let doc = block.description.clone().unwrap_or_default();
        let base = Literal::u32_unsuffixed(peripheral.address);
        let size = Literal::u32_unsuffixed(peripheral.size);
        let addressing = match peripheral.addressing {
            Addressing::Absolute => quote!(Addressing::Absolute),
            Addressing::Relative => quote!(Addressing::Relative),
        };
        let access = access_tokens(&peripheral.access);

        let mut registers = TokenStream::new();
        for item in &block.items {
            let reg_name = format_ident!("{}", item.name.to_uppercase());
            let address = match peripheral.addressing {
                Addressing::Absolute => peripheral.address + item.byte_offset,
                Addressing::Relative => item.byte_offset,
            };
            let address = Literal::u32_unsuffixed(address);
            let reg_doc = item.description.clone().unwrap_or_else(|| item.name.clone());
            registers.extend(quote! {
                #[doc = #reg_doc]
                pub const #reg_name: u32 = #address;
            });
            if let Some(fieldset) = &item.inner.fieldset {
                registers.extend(generate_field_mod(&item.name, fieldset, ir)?);
            }
        }

        mods.extend(quote! {
            #[doc = #doc]
            pub mod #mod_name {
                use crate::regs::{Access, Addressing, RegisterWindowConfig};

                /// Register window covering this peripheral.
                pub const WINDOW: RegisterWindowConfig = RegisterWindowConfig {
                    base: #base,
                    size: #size,
                    addressing: #addressing,
                    access: #access,
                };

                #registers
            }
        });
    }

    Ok(mods)
}

fn generate_pcsm_mod(block: &Block, ir: &IR) -> Result<TokenStream, Box<dyn std::error::Error>> {
    let doc = block.description.clone().unwrap_or_default();
    let mut registers = TokenStream::new();

    for item in &block.items {
        let reg_name = format_ident!("{}", item.name.to_uppercase());
        let index = u8::try_from(item.byte_offset)
            .map_err(|_| format!("PCSM register {} index does not fit in a byte", item.name))?;
        let index = Literal::u8_unsuffixed(index);
        let reg_doc = item.description.clone().unwrap_or_else(|| item.name.clone());
        registers.extend(quote! {
            #[doc = #reg_doc]
            pub const #reg_name: u8 = #index;
        });
        if let Some(fieldset) = &item.inner.fieldset {
            registers.extend(generate_field_mod(&item.name, fieldset, ir)?);
        }
    }

    Ok(quote! {
        #[doc = #doc]
        pub mod pcsm {
            #registers
        }
    })
}

fn generate_field_mod(
    register: &str,
    fieldset_name: &str,
    ir: &IR,
) -> Result<TokenStream, Box<dyn std::error::Error>> {
    let fieldset: &FieldSet = ir
        .fieldsets
        .get(fieldset_name)
        .ok_or_else(|| format!("fieldset {} not found", fieldset_name))?;

    let mod_name = format_ident!("{}", register.to_lowercase());
    let masks = fieldset.fields.iter().map(|field| {
        let name = format_ident!("{}", field.name.to_uppercase());
        let mask = Literal::u32_unsuffixed(field.mask());
        let doc = field.description.clone().unwrap_or_else(|| field.name.clone());
        quote! {
            #[doc = #doc]
            pub const #name: u32 = #mask;
        }
    });
    let doc = format!("Field masks of `{}`.", register.to_uppercase());

    Ok(quote! {
        #[doc = #doc]
        pub mod #mod_name {
            #(#masks)*
        }
    })
}

fn generate_interrupts(interrupts: &Interrupts) -> TokenStream {
    let variants = interrupts.m33.iter().map(|irq| {
        let name = format_ident!("{}", irq.name);
        let value = Literal::u16_unsuffixed(irq.value as u16);
        let doc = irq.description.clone().unwrap_or_else(|| String::from("Unused"));
        quote! {
            #[doc = #doc]
            #name = #value
        }
    });

    let vector_count = interrupts
        .m33
        .iter()
        .map(|irq| irq.value as usize + 1)
        .max()
        .unwrap_or(0);

    let handler_names: Vec<_> = interrupts
        .m33
        .iter()
        .map(|irq| format_ident!("{}", irq.name))
        .collect();

    let vectors = (0..vector_count).map(|slot| {
        match interrupts.m33.iter().find(|irq| irq.value as usize == slot) {
            Some(irq) => {
                let name = format_ident!("{}", irq.name);
                quote!(Vector { _handler: #name })
            }
            None => quote!(Vector { _reserved: 0 }),
        }
    });
    let vector_count = Literal::usize_unsuffixed(vector_count);

    quote! {
        /// Number of priority bits implemented by the NVIC.
        pub const NVIC_PRIO_BITS: u8 = 3;

        /// Device interrupt lines of the Cortex-M33 core.
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u16)]
        pub enum Interrupt {
            #(#variants,)*
        }

        unsafe impl cortex_m::interrupt::InterruptNumber for Interrupt {
            #[inline(always)]
            fn number(self) -> u16 {
                self as u16
            }
        }

        #[cfg(feature = "rt")]
        mod vector_table {
            extern "C" {
                #(fn #handler_names();)*
            }

            pub union Vector {
                _handler: unsafe extern "C" fn(),
                _reserved: u32,
            }

            #[link_section = ".vector_table.interrupts"]
            #[no_mangle]
            pub static __INTERRUPTS: [Vector; #vector_count] = [
                #(#vectors,)*
            ];
        }
    }
}

fn access_tokens(access: &Access) -> TokenStream {
    match access {
        Access::ReadWrite => quote!(Access::ReadWrite),
        Access::Read => quote!(Access::ReadOnly),
        Access::Write => quote!(Access::WriteOnly),
    }
}

enum GetOneError {
    None,
    Multiple,
}

trait IteratorExt: Iterator {
    fn get_one(self) -> Result<Self::Item, GetOneError>;
}

impl<T: Iterator> IteratorExt for T {
    fn get_one(mut self) -> Result<Self::Item, GetOneError> {
        match self.next() {
            None => Err(GetOneError::None),
            Some(res) => match self.next() {
                Some(_) => Err(GetOneError::Multiple),
                None => Ok(res),
            },
        }
    }
}

/// rustfmt a given path.
/// Failures are logged to stderr and ignored.
fn rustfmt(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match Command::new("rustfmt").args([path]).output() {
        Err(e) => {
            eprintln!("failed to exec rustfmt {:?}: {:?}", path, e);
        }
        Ok(out) => {
            if !out.status.success() {
                eprintln!("rustfmt {:?} failed:", path);
                eprintln!("=== STDOUT:");
                let _ = std::io::stderr().write_all(&out.stdout);
                eprintln!("=== STDERR:");
                let _ = std::io::stderr().write_all(&out.stderr);
            }
        }
    }
}
