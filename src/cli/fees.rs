//! Fees command implementation

use crate::config::Config;
use crate::fees::FeeCalculator;
use clap::Args;
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct FeesArgs {
    /// Contract price in [0, 1]
    #[arg(short, long)]
    pub price: Decimal,

    /// Number of contracts
    #[arg(long, default_value_t = 100)]
    pub contracts: u32,
}

impl FeesArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if self.price < Decimal::ZERO || self.price > Decimal::ONE {
            anyhow::bail!("price must be within [0, 1], got {}", self.price);
        }

        let taker = FeeCalculator::taker(&config.fees);
        let maker = FeeCalculator::maker(&config.fees);
        println!("Price:            {}", self.price);
        println!("Contracts:        {}", self.contracts);
        println!("Taker fee:        {:.4}", taker.fee(self.price, self.contracts));
        println!("Maker fee:        {:.4}", maker.fee(self.price, self.contracts));
        println!(
            "Round trip:       {:.4}",
            taker.round_trip(self.price, self.price, self.contracts)
        );
        println!(
            "Break-even move:  {:.4}",
            taker.break_even_move(self.price, self.contracts)
        );
        Ok(())
    }
}
