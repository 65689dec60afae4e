//! Vendor instructions

use anchor_lang::prelude::*;
use flip_logic::{SEQUENCE_BASE, VENDOR_SEED};

use crate::state::Vendor;

/// Create the global game counter (one-time setup)
#[derive(Accounts)]
pub struct InitializeVendor<'info> {
    #[account(
        init,
        payer = payer,
        space = Vendor::LEN,
        seeds = [VENDOR_SEED],
        bump
    )]
    pub vendor: Account<'info, Vendor>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn initialize_vendor(ctx: Context<InitializeVendor>) -> Result<()> {
    let vendor = &mut ctx.accounts.vendor;
    vendor.counter = SEQUENCE_BASE;
    vendor.bump = ctx.bumps.vendor;

    msg!("Vendor initialized by {}", ctx.accounts.payer.key());

    Ok(())
}
